pub mod certificate_matcher;
pub mod event_loop;
pub mod mirror_scheduler;
pub mod network_inspector;
pub mod reconciler;
pub mod resource_mirror;

pub use certificate_matcher::CertificateMatcher;
pub use event_loop::EventLoop;
pub use mirror_scheduler::{MirrorScheduler, MirrorSignal, NoopMirrorSignal};
pub use network_inspector::NetworkInspector;
pub use reconciler::Reconciler;
