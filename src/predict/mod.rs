pub mod fanout;
pub mod prompt;
pub mod provider;
pub mod schema;

pub use fanout::{PredictionFanout, ProviderPrediction};
pub use provider::{HttpChatProvider, PredictionProvider};
