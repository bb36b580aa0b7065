pub mod errors;
pub mod memtable;
pub mod wire;
pub mod workload;

pub use errors::*;
pub use memtable::*;
pub use wire::Message;
pub use workload::*;
