pub mod encoding_line;
pub mod routing;

pub use encoding_line::{parse, EncodingLineRecord, ParseError};
pub use routing::{aba_checksum_valid, RoutingNumber};
