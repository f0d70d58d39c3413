pub mod agreement;
pub mod observation;
pub mod registry;
pub mod service;
pub mod store;
pub mod writer;

pub use agreement::AgreementCalculator;
pub use observation::Validation;
pub use registry::{Chain, ChainRegistry, RegistryConfig};
pub use service::{Monitor, MonitorConfig, MonitorHandle};
pub use store::{AgreementStore, AgreementWindow, Gateway};
pub use writer::{WriteOp, WriteQueue};
