use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Options invariant: the database seed cannot exceed the population.
    #[snafu(display("pick_database_topk ({topk}) exceeds init_population_num ({population})"))]
    TopkExceedsPopulation { topk: usize, population: usize },

    /// Options invariant: at least one initial candidate is required.
    #[snafu(display("init_population_num must be at least 1"))]
    EmptyPopulation,

    /// Options invariant: at least one sample must be requested.
    #[snafu(display("num_samples_per_iteration must be at least 1"))]
    NoSamplesRequested,

    /// Options invariant: the exploration fraction is a probability.
    #[snafu(display("eps_greedy must lie in [0, 1], got {value}"))]
    EpsGreedyOutOfRange { value: f64 },

    /// Crossover parents must expose the same number of function expressions.
    #[snafu(display("crossover requires parents with matching function counts, got {left} and {right}"))]
    CrossoverArityMismatch { left: usize, right: usize },

    /// Task key absent from the registry.
    #[snafu(display("task `{task_key}` is not registered"))]
    TaskNotFound { task_key: String },

    /// A descriptor did not replay on the base module.
    #[snafu(display("descriptor replay failed: {source}"))]
    ReplayFailed { source: kuzna_ir::Error },

    /// A random draw inside the search hit an empty range.
    #[snafu(display("search sampling failed: {source}"))]
    Sampling { source: kuzna_ir::Error },

    /// A record's descriptor bytes could not be encoded or decoded.
    #[snafu(display("tuning record codec failure: {source}"))]
    RecordCodec { source: kuzna_ir::Error },

    /// A rule did not accept its input. Local to sketch generation and the
    /// schedule-then-mutate step; callers skip the branch or fall back to
    /// re-scoring the input.
    #[snafu(display("rule `{rule}` rejected the candidate"))]
    RuleRejected { rule: &'static str },

    /// An unrecognized sketch-generation strategy name.
    #[snafu(display("unknown sketch strategy `{name}`"))]
    UnknownStrategy { name: String },

    /// Persistent database could not be opened.
    #[snafu(display("cannot open record database: {message}"))]
    DatabaseOpen { message: String },

    /// Persistent database write failed.
    #[snafu(display("cannot write record database: {message}"))]
    DatabaseWrite { message: String },

    /// The search pipeline produced no candidate at all.
    #[snafu(display("search produced no candidates"))]
    EmptySearchResult,
}
