pub mod agreement_score;
pub mod daily_agreement;
pub mod hourly_agreement;
pub mod validator;
pub mod validator_key;

pub use agreement_score::AgreementScore;
pub use daily_agreement::DailyAgreement;
pub use hourly_agreement::HourlyAgreement;
pub use validator::Validator;
pub use validator_key::ValidatorKey;
