pub mod batch;
pub mod connection;
pub mod dataloader;
pub mod decoder;
pub mod error;
pub mod query;
pub mod schema;
pub mod table;
pub mod tensor;
#[cfg(feature = "torch")]
pub mod torch;
pub mod transport;

pub use batch::{Batch, Payload, RawBatch, RawFormat};
pub use connection::{AsyncQueryResult, GraphConnection, QueryParams, QueryStatus};
pub use dataloader::{BrokerConfig, Loader, LoaderConfig, LoaderData, LoaderIter, LoaderKind};
pub use decoder::OutputFormat;
pub use error::{loader_error, ErrorCategory, LoaderError};
pub use schema::{AttrType, AttrTypes, SchemaSnapshot};
pub use table::{Column, ColumnData, Table};
pub use tensor::{GraphLayout, GraphTensor, Tensor, TensorData};
pub use transport::{Broker, BrokerMessage, TopicSpec};
