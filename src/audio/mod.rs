pub mod recorder;

pub use recorder::MicRecorder;
