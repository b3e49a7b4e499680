pub mod error;
pub mod kinds;
pub mod messages;


pub use error::{Result, TetherError};
pub use kinds::{kind, ErrorKindRegistry};
pub use messages::{CallMessage, CallbackMessage, ErrorDescriptor, MessageId, MethodName, RpcArgs};
