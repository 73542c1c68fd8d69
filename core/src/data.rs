/// Input types for one labeled training example.
///
/// Tokenization and dictionary construction live outside the core; the
/// classifier only reads integer word ids, which must fall in
/// [0, vocab_size).

/// One token of an input sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub word: usize,
}

impl Token {
    pub fn new(word: usize) -> Self {
        Token { word }
    }
}

/// A token sequence paired with its gold class label.
#[derive(Clone, Debug)]
pub struct Example {
    pub tokens: Vec<Token>,
    pub label: usize,
}

impl Example {
    pub fn new(word_ids: &[usize], label: usize) -> Self {
        Example {
            tokens: word_ids.iter().map(|&w| Token::new(w)).collect(),
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_from_ids() {
        let ex = Example::new(&[3, 1, 4], 2);
        assert_eq!(ex.tokens.len(), 3);
        assert_eq!(ex.tokens[0].word, 3);
        assert_eq!(ex.tokens[2].word, 4);
        assert_eq!(ex.label, 2);
    }
}
