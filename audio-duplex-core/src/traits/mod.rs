pub mod audio_backend;
pub mod endpoint;
pub mod session_observer;
