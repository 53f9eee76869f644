#![doc = "Beamlink Harness\n\nIn-memory stand-ins for the radio and the host platform, shared by the\nruntime tests and the CLI simulation. Everything lives behind the\n`testing` feature."]

#[cfg(any(test, feature = "testing"))]
pub mod channels;
#[cfg(any(test, feature = "testing"))]
pub mod collaborators;
#[cfg(any(test, feature = "testing"))]
pub mod provider;

#[cfg(any(test, feature = "testing"))]
pub use channels::{loopback_pair, LoopbackChannel};
#[cfg(any(test, feature = "testing"))]
pub use collaborators::{
    RecordedEvent, RecordingListener, RecordingSink, StaticPayloadProvider, StubForeground,
    StubPrompt, StubResolver, StubTransferInitiator, StubUnlock,
};
#[cfg(any(test, feature = "testing"))]
pub use provider::{InboundReceiver, MockLinkProvider};
