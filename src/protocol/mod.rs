//! Wire protocol: frame layout and the incremental codec

pub mod codec;
pub mod frame;
