use conduit::error::ConduitError;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type PrimesResult<T> = Result<T, PrimesError>;

/// Backtrace captured when an error variant without its own backtrace is created.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the primes binary.
#[derive(Debug)]
pub enum PrimesError {
    /// The pipeline could not be wired or one of its stages failed.
    Conduit(ConduitError),
    /// Configuration could not be loaded or is invalid.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// I/O error outside the pipeline, such as a failure to build the runtime.
    Io(std::io::Error, CapturedBacktrace),
    /// Any other failure while running the pipeline.
    Run(anyhow::Error),
}

impl PrimesError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            PrimesError::Conduit(_) => "pipeline error",
            PrimesError::Config(_, _) => "configuration error",
            PrimesError::Io(_, _) => "i/o error",
            PrimesError::Run(_) => "runtime error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            PrimesError::Conduit(err) => err.backtrace(),
            PrimesError::Config(_, captured) => Some(&captured.0),
            PrimesError::Io(_, captured) => Some(&captured.0),
            PrimesError::Run(err) => Some(err.backtrace()),
        }
    }

    /// Creates a configuration error from any error type.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        PrimesError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a report for terminal output: category, message, causes, and the backtrace when
    /// `RUST_BACKTRACE` asks for one.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("conduit-primes failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        // Aggregated pipeline errors already list every failure in their message.
        let aggregated = matches!(self, PrimesError::Conduit(err) if err.errors().is_some());
        if !aggregated {
            let mut source = Error::source(self);
            let mut index = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {index}: {err}\n"));
                source = err.source();
                index += 1;
            }
        }

        if should_render_backtrace() {
            if let Some(backtrace) = self.backtrace() {
                out.push_str("backtrace:\n");
                out.push_str(&backtrace.to_string());
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
        }

        out
    }
}

impl fmt::Display for PrimesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimesError::Conduit(err) => write!(f, "{err}"),
            PrimesError::Config(source, _) => write!(f, "configuration error: {source}"),
            PrimesError::Io(source, _) => write!(f, "i/o error: {source}"),
            PrimesError::Run(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PrimesError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PrimesError::Conduit(err) => err.source(),
            PrimesError::Config(source, _) => Some(source.as_ref()),
            PrimesError::Io(source, _) => Some(source),
            PrimesError::Run(err) => err.source(),
        }
    }
}

impl From<std::io::Error> for PrimesError {
    fn from(err: std::io::Error) -> Self {
        PrimesError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<ConduitError> for PrimesError {
    fn from(err: ConduitError) -> Self {
        PrimesError::Conduit(err)
    }
}

impl From<anyhow::Error> for PrimesError {
    /// Recovers pipeline errors from the run loop so they keep their classification.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ConduitError>() {
            Ok(err) => PrimesError::Conduit(err),
            Err(err) => PrimesError::Run(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit::error::ErrorKind;

    #[test]
    fn test_conduit_errors_survive_anyhow() {
        let err = anyhow::Error::new(ConduitError::from((ErrorKind::StagePanic, "boom")));

        let err = PrimesError::from(err);

        assert!(matches!(err, PrimesError::Conduit(ref inner) if inner.kind() == ErrorKind::StagePanic));
        assert_eq!(err.category(), "pipeline error");
    }

    #[test]
    fn test_report_lists_causes() {
        let io = std::io::Error::other("disk on fire");
        let err = PrimesError::config(io);

        let report = err.render_report();

        assert!(report.contains("category: configuration error"));
        assert!(report.contains("cause 1: disk on fire"));
    }
}
