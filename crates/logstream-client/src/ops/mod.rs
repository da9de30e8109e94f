mod consumers;
mod records;
mod shards;
mod stream;
mod subscribe;

pub use consumers::*;
pub use records::*;
pub use shards::*;
pub use stream::*;
pub use subscribe::*;
