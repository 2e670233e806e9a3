mod cache;
mod clock;
mod context;
mod eval;
mod flag;
mod overrides;
mod service;
mod store;
mod test_common;

pub use cache::*;
pub use clock::*;
pub use context::*;
pub use eval::*;
pub use flag::*;
pub use overrides::*;
pub use service::*;
pub use store::*;
