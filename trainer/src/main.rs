// End-to-end training harness on a synthetic phrase-classification task.
//
// Generates short subject-verb-object phrases from fixed word pools,
// interns them through a small dictionary, and trains the selected cell
// variant, printing the usual per-epoch report. Run with key=value flags:
//
//   cargo run --release -- kind=gru hidden=16 epochs=20 lr=0.2 seed=42

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use retrace_core::activation::Activation;
use retrace_core::classifier::SequenceClassifier;
use retrace_core::data::Example;
use retrace_core::model::{CellKind, ClassifierConfig, JsonParamStore};
use retrace_core::tensor::SimpleRng;
use retrace_core::trainer::{ConsoleReporter, train};

struct Options {
    kind: CellKind,
    embedding_dim: usize,
    hidden_size: usize,
    epochs: usize,
    learning_rate: f64,
    seed: u64,
    train_size: usize,
    dev_size: usize,
    test_size: usize,
    save_path: Option<PathBuf>,
}

impl Options {
    fn default_options() -> Self {
        Options {
            kind: CellKind::Gru,
            embedding_dim: 8,
            hidden_size: 16,
            epochs: 20,
            learning_rate: 0.2,
            seed: 42,
            train_size: 200,
            dev_size: 50,
            test_size: 50,
            save_path: None,
        }
    }

    fn from_args() -> Self {
        let mut opts = Self::default_options();
        for arg in env::args().skip(1) {
            let arg = arg.trim_start_matches("--");
            if let Some((key, value)) = arg.split_once('=') {
                match key.to_lowercase().as_str() {
                    "kind" => {
                        opts.kind = match value.to_lowercase().as_str() {
                            "plain" => CellKind::Plain,
                            "gru" => CellKind::Gru,
                            "bigru" => CellKind::BiGru,
                            other => {
                                eprintln!("unknown cell kind {other}, keeping {:?}", opts.kind);
                                opts.kind
                            }
                        }
                    }
                    "embedding" => opts.embedding_dim = value.parse().unwrap_or(opts.embedding_dim),
                    "hidden" => opts.hidden_size = value.parse().unwrap_or(opts.hidden_size),
                    "epochs" => opts.epochs = value.parse().unwrap_or(opts.epochs),
                    "lr" => opts.learning_rate = value.parse().unwrap_or(opts.learning_rate),
                    "seed" => opts.seed = value.parse().unwrap_or(opts.seed),
                    "train" => opts.train_size = value.parse().unwrap_or(opts.train_size),
                    "dev" => opts.dev_size = value.parse().unwrap_or(opts.dev_size),
                    "test" => opts.test_size = value.parse().unwrap_or(opts.test_size),
                    "save" => opts.save_path = Some(PathBuf::from(value)),
                    _ => eprintln!("ignoring unknown option {key}"),
                }
            }
        }
        opts
    }
}

/// Insertion-ordered word dictionary: first occurrence fixes the id, so a
/// fixed generation seed fixes every id.
struct Vocabulary {
    index: HashMap<String, usize>,
    words: Vec<String>,
}

impl Vocabulary {
    fn new() -> Self {
        Vocabulary { index: HashMap::new(), words: Vec::new() }
    }

    fn intern(&mut self, word: &str) -> usize {
        if let Some(&id) = self.index.get(word) {
            return id;
        }
        let id = self.words.len();
        self.words.push(word.to_string());
        self.index.insert(word.to_string(), id);
        id
    }

    fn num_words(&self) -> usize {
        self.words.len()
    }
}

const SUBJECTS: &[&str] = &["the critic", "my neighbor", "that reviewer", "everyone", "nobody"];
const VERBS: &[&str] = &["found", "called", "considered", "rated", "thought"];
const PRAISE: &[&str] = &["brilliant", "delightful", "superb", "moving", "sharp"];
const PANS: &[&str] = &["tedious", "clumsy", "hollow", "forgettable", "muddled"];
const OBJECTS: &[&str] = &["the film", "the book", "the play", "it", "the album"];

/// Generate `n` labeled phrases: label 1 when the judgement word comes from
/// the praise pool.
fn generate_split(rng: &mut SimpleRng, vocab: &mut Vocabulary, n: usize) -> Vec<Example> {
    (0..n)
        .map(|_| {
            let positive = rng.next_u64() % 2 == 0;
            let judgement = if positive {
                PRAISE[rng.next_below(PRAISE.len())]
            } else {
                PANS[rng.next_below(PANS.len())]
            };
            let phrase = format!(
                "{} {} {} {}",
                SUBJECTS[rng.next_below(SUBJECTS.len())],
                VERBS[rng.next_below(VERBS.len())],
                OBJECTS[rng.next_below(OBJECTS.len())],
                judgement,
            );
            let ids: Vec<usize> = phrase.split_whitespace().map(|w| vocab.intern(w)).collect();
            Example::new(&ids, usize::from(positive))
        })
        .collect()
}

fn main() {
    let opts = Options::from_args();

    let mut vocab = Vocabulary::new();
    let mut rng = SimpleRng::new(opts.seed);
    let train_set = generate_split(&mut rng, &mut vocab, opts.train_size);
    let dev_set = generate_split(&mut rng, &mut vocab, opts.dev_size);
    let test_set = generate_split(&mut rng, &mut vocab, opts.test_size);

    let cfg = ClassifierConfig {
        kind: opts.kind,
        vocab_size: vocab.num_words(),
        embedding_dim: opts.embedding_dim,
        hidden_size: opts.hidden_size,
        output_size: 2,
        activation: Activation::Logistic,
        learn_initial_state: true,
    };

    let mut clf = SequenceClassifier::new(cfg);
    clf.initialize_parameters(opts.seed);

    println!(
        "Training {:?} cell: vocab={} embedding={} hidden={} params={}",
        opts.kind,
        vocab.num_words(),
        opts.embedding_dim,
        opts.hidden_size,
        clf.params.num_params(),
    );

    let mut reporter = ConsoleReporter;
    let reports = match train(
        &mut clf,
        &train_set,
        &dev_set,
        &test_set,
        opts.epochs,
        opts.learning_rate,
        &mut reporter,
    ) {
        Ok(reports) => reports,
        Err(e) => {
            eprintln!("training aborted: {e}");
            std::process::exit(1);
        }
    };

    if let Some(last) = reports.last() {
        println!(
            "Final: train {:.4} dev {:.4} test {:.4}",
            last.train_accuracy, last.dev_accuracy, last.test_accuracy
        );
    }

    if let Some(path) = opts.save_path {
        match JsonParamStore::from_params(&clf.params).save(&path) {
            Ok(()) => println!("Saved parameters to {}", path.display()),
            Err(e) => {
                eprintln!("failed to save parameters: {e}");
                std::process::exit(1);
            }
        }
    }
}
