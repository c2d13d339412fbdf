pub mod groq;
pub mod tutor;

pub use groq::GroqClient;
pub use tutor::TutorClient;

#[cfg(test)]
pub(crate) mod test_server;
