//! Reader and writer handles.
//!
//! - Readers: observe a state through a listener, can be unregistered and
//!   registered again
//! - Writers: the single capability to change a state's value

mod reader;
mod writer;

pub(crate) use reader::ReaderInner;
pub use reader::Reader;
pub use writer::Writer;
