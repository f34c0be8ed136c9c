pub mod health;
pub mod error;
pub mod messages;
pub mod diagram;
pub mod collaboration;

pub use health::*;
pub use error::*;
pub use messages::*;
pub use diagram::*;
pub use collaboration::*;
