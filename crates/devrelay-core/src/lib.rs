#![warn(missing_docs)]

//! devrelay core: relays a time-travel store's history to a remote observer
//! and applies the observer's commands back to the store.

pub mod codec;
pub mod config;
pub mod creators;
pub mod dispatcher;
pub mod error;
pub mod filters;
pub mod instrument;
pub mod lifted;
pub mod message;
pub mod recording;
pub mod registry;
pub mod relay;
pub mod transport;

pub use codec::{Codec, JsonCodec};
pub use config::{EnhancerOptions, RelayConfig};
pub use creators::{ActionCreator, ActionCreators};
pub use error::RelayError;
pub use filters::{ActionFilter, FilterConfig, Sanitizers};
pub use instrument::{DevToolsStore, InstrumentOptions, InstrumentedStore, Reducer};
pub use lifted::{LiftedAction, LiftedState};
pub use message::{InboundEvent, InboundMessage, MessageType, OutboundEnvelope, OutboundMessage};
pub use relay::{Relay, StoreHandle};
pub use transport::{channel_pair, ChannelTransport, ObserverEndpoint, Transport};
