//! peerlog-services — identity registry, packet logger, and the transport
//! adapter that ties them together.

pub mod ingress;
pub mod logger;
pub mod registry;
pub mod sink;

pub use ingress::{IngressError, PacketIngress};
pub use logger::{LoggerConfig, LoggerStats, PacketLogger, SharedLogger};
pub use registry::{IdentityRegistry, RegistryError, SharedRegistry, Slot, SlotState};
pub use sink::{FileSink, LogSink, NullSink, SinkError};
