mod byte_stream;
pub mod header;
mod http_transport;

pub use byte_stream::ByteStream;
pub use http_transport::HttpTransport;
