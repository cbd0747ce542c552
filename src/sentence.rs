use std::fmt::Display;

/// Produces a fresh example sentence for a word, using only vocabulary the
/// learner already knows.
pub trait SentenceGenerator {
    type Error: Display;

    fn generate(&mut self, word: &str, vocabulary: &[String]) -> Result<String, Self::Error>;
}

impl<F, E> SentenceGenerator for F
where
    F: FnMut(&str, &[String]) -> Result<String, E>,
    E: Display,
{
    type Error = E;

    fn generate(&mut self, word: &str, vocabulary: &[String]) -> Result<String, E> {
        self(word, vocabulary)
    }
}

/// Never produces a sentence; cards keep their original one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSentences;

impl SentenceGenerator for NoSentences {
    type Error = &'static str;

    fn generate(&mut self, _word: &str, _vocabulary: &[String]) -> Result<String, Self::Error> {
        Err("sentence generation disabled")
    }
}
