pub mod paper;
pub mod traits;

pub use paper::PaperBroker;
pub use traits::BrokerClient;
