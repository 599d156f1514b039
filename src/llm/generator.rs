//! Text-generation collaborator used by the chat controller.

use std::future::Future;
use std::pin::Pin;

use crate::chat::parts::UserContent;
use crate::core::errors::GenerationResult;

/// Boxed future type for generator operations.
pub type GenerationFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Starts one streaming generation per chat request.
pub trait TextGenerator: Send + Sync {
    /// Open a generation for the given user parts.
    ///
    /// # Errors
    /// Returns an error if the model cannot be reached before any output.
    fn start(
        &self,
        parts: Vec<UserContent>,
    ) -> GenerationFuture<'_, GenerationResult<Box<dyn TextStream>>>;
}

/// Pull-based sequence of text fragments from one generation.
///
/// Dropping the stream cancels the underlying call.
pub trait TextStream: Send {
    /// Next fragment, or `None` once the generation has ended.
    ///
    /// # Errors
    /// Returns an error if the generation fails mid-stream.
    fn next_delta(&mut self) -> GenerationFuture<'_, GenerationResult<Option<String>>>;

    /// Full text of the finished generation.
    fn final_text(&self) -> String;
}
