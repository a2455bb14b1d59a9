//! Host notification surface
//!
//! The subsystem has no UI of its own; user-visible outcomes are delivered
//! through this trait.

/// Host capability: user-facing notifications
pub trait HostApi {
    /// Surface an error with a short title and a longer body
    fn notify_error(&mut self, title: &str, message: &str);

    /// A voice/video call is ringing and waits for
    /// [`accept_call`](crate::MediaManager::accept_call)
    fn incoming_call(&mut self, call_id: &str, from: &str, with_video: bool);

    /// A file transfer offer arrived and waits for
    /// [`accept_file`](crate::MediaManager::accept_file)
    fn incoming_file(&mut self, call_id: &str, from: &str, file_name: &str, file_size: u64);

    /// A call reached the established state
    fn call_established(&mut self, _call_id: &str) {}

    /// A call left the registry
    fn call_ended(&mut self, _call_id: &str) {}
}
