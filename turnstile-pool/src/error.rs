/// Which setup step a worker socket failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Bind,
    Listen,
    Accept,
    Poll,
}

#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    #[error("worker socket setup failed at {stage:?}: {source}")]
    IoSetupFailed {
        stage: SetupStage,
        #[source]
        source: std::io::Error,
    },

    #[error("no bucket has spare capacity")]
    CapacityExhausted,

    #[error("worker port range overlaps an existing bucket")]
    PortRangeOverlap,
}
