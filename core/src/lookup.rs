/// Embedding table: dense word-id → vector lookup with in-place SGD updates.
///
/// Row-major [num_words + 1, embedding_dim]; row 0 is reserved for
/// unknown/padding, so word id `w` lives in row `w + 1`. The table is the
/// only parameter updated sparsely — the backward pass touches exactly the
/// rows referenced by the current sequence.

use serde::{Serialize, Deserialize};
use crate::data::Token;
use crate::model::ModelError;
use crate::tensor::{Tensor, axpy_f64};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    pub table: Tensor,
}

impl LookupTable {
    pub fn new(num_words: usize, embedding_dim: usize) -> Self {
        LookupTable {
            table: Tensor::zeros(&[num_words + 1, embedding_dim]),
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.table.cols()
    }

    pub fn num_words(&self) -> usize {
        self.table.rows().saturating_sub(1)
    }

    /// Assemble the input matrix X [T, D]: row t is the embedding of
    /// token t. Fails on any id outside [0, num_words).
    pub fn lookup(&self, tokens: &[Token]) -> Result<Tensor, ModelError> {
        let d = self.embedding_dim();
        let mut x = Tensor::zeros(&[tokens.len(), d]);
        for (t, tok) in tokens.iter().enumerate() {
            let row = tok.word + 1;
            if row >= self.table.rows() {
                return Err(ModelError::InvalidTokenId {
                    position: t,
                    word: tok.word,
                    vocab_size: self.num_words(),
                });
            }
            x.row_mut(t).copy_from_slice(self.table.row(row));
        }
        Ok(x)
    }

    /// Update the embedding rows touched by `tokens`:
    /// row(token[t]) -= rate * dx[t], one subtraction per position in
    /// sequence order. A word id appearing k times receives k separate
    /// subtractions, not one pre-summed update.
    pub fn apply_gradients(&mut self, tokens: &[Token], dx: &Tensor, rate: f64) {
        debug_assert_eq!(dx.rows(), tokens.len());
        debug_assert_eq!(dx.cols(), self.embedding_dim());
        for (t, tok) in tokens.iter().enumerate() {
            let row = tok.word + 1;
            debug_assert!(row < self.table.rows());
            axpy_f64(-rate, dx.row(t), self.table.row_mut(row));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_marked_rows(num_words: usize, dim: usize) -> LookupTable {
        let mut lt = LookupTable::new(num_words, dim);
        for r in 0..lt.table.rows() {
            for c in 0..dim {
                lt.table.row_mut(r)[c] = (r * 10 + c) as f64;
            }
        }
        lt
    }

    #[test]
    fn test_lookup_assembles_rows() {
        let lt = table_with_marked_rows(3, 2);
        let tokens = [Token::new(0), Token::new(2)];
        let x = lt.lookup(&tokens).unwrap();
        assert_eq!(x.shape, vec![2, 2]);
        // word 0 → row 1, word 2 → row 3
        assert_eq!(x.row(0), &[10.0, 11.0]);
        assert_eq!(x.row(1), &[30.0, 31.0]);
    }

    #[test]
    fn test_lookup_rejects_out_of_range_id() {
        let lt = LookupTable::new(3, 2);
        let tokens = [Token::new(0), Token::new(3)];
        let err = lt.lookup(&tokens).unwrap_err();
        assert_eq!(
            err,
            ModelError::InvalidTokenId { position: 1, word: 3, vocab_size: 3 }
        );
    }

    #[test]
    fn test_update_touches_only_referenced_rows() {
        let mut lt = table_with_marked_rows(3, 2);
        let before = lt.table.clone();
        let tokens = [Token::new(0), Token::new(1)];
        let mut dx = Tensor::zeros(&[2, 2]);
        dx.row_mut(0).copy_from_slice(&[1.0, 2.0]);
        dx.row_mut(1).copy_from_slice(&[3.0, 4.0]);

        lt.apply_gradients(&tokens, &dx, 0.5);

        // Rows for ids 0 and 1 moved.
        assert_eq!(lt.table.row(1), &[10.0 - 0.5, 11.0 - 1.0]);
        assert_eq!(lt.table.row(2), &[20.0 - 1.5, 21.0 - 2.0]);
        // Reserved row and the untouched id 2 are bit-identical.
        assert_eq!(lt.table.row(0), before.row(0));
        assert_eq!(lt.table.row(3), before.row(3));
    }

    #[test]
    fn test_update_repeated_id_applies_sequentially() {
        let mut lt = LookupTable::new(2, 1);
        let tokens = [Token::new(1), Token::new(1)];
        let mut dx = Tensor::zeros(&[2, 1]);
        dx.data[0] = 1.0;
        dx.data[1] = 10.0;

        lt.apply_gradients(&tokens, &dx, 1.0);

        // Two separate subtractions land on the same row.
        assert_eq!(lt.table.row(2), &[-11.0]);
    }
}
