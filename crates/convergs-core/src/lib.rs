pub mod config;
pub mod identity;
pub mod machine;
pub mod pacing;
pub mod playground;
pub mod qualification;
pub mod session;

pub use config::*;
pub use identity::*;
pub use machine::*;
pub use pacing::*;
pub use playground::*;
pub use qualification::*;
pub use session::*;
