mod cert;
mod identity;
mod target;
mod trust_pool;

pub use cert::*;
pub use identity::*;
pub use target::*;
pub use trust_pool::*;
