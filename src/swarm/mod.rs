//! Swarm connection environment derivation.
//!
//! Every compose and docker invocation that targets the cluster runs under a
//! [`SwarmEnvironment`]: the ambient snapshot taken at orchestrator start,
//! overlaid with the machine-specific exports (endpoint, TLS material,
//! discovery URL) fetched from the provider. The environment is a plain value
//! that is recomputed per run and passed verbatim as the child process
//! environment, never mutated global state.

use thiserror::Error;

use crate::exec::EnvMap;
use crate::machine::{ConnectionConfig, ConnectionScope, MachineProvider};


/// Complete child environment for cluster-targeted invocations.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SwarmEnvironment {
    /// Variables passed verbatim as the full process environment.
    pub variables: EnvMap,
}

/// Errors raised while parsing a connection export script.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptError {
    /// Raised when the script contains no export assignments.
    #[error("no export lines found in connection script")]
    NoExports,
    /// Raised when an export line carries no assignment.
    #[error("export line without '=': {line}")]
    MissingAssignment {
        /// Offending script line.
        line: String,
    },
}

/// Errors surfaced while building a swarm environment.
#[derive(Debug, Error)]
pub enum EnvironmentError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when fetching the connection environment fails.
    #[error("failed to fetch connection environment for {name}")]
    Fetch {
        /// Machine whose environment was requested.
        name: String,
        /// Provider-specific error.
        #[source]
        source: E,
    },
    /// Raised when the export script cannot be parsed.
    #[error(transparent)]
    Parse(#[from] ScriptError),
}

/// Parses a connection script and merges it over the ambient snapshot.
///
/// Ambient entries act as defaults; machine-specific exports override
/// duplicates. Non-export lines (comments, blank lines) are ignored.
///
/// # Errors
///
/// Returns [`ScriptError`] when the script contains no export lines or an
/// export line without an assignment.
pub fn derive(
    ambient: &EnvMap,
    config: &ConnectionConfig,
) -> Result<SwarmEnvironment, ScriptError> {
    let mut variables = ambient.clone();
    let mut exports = 0_usize;

    for line in config.script.lines() {
        let Some(assignment) = line.trim().strip_prefix("export ") else {
            continue;
        };
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(ScriptError::MissingAssignment {
                line: line.to_owned(),
            });
        };
        variables.insert(key.trim().to_owned(), unquote(value).to_owned());
        exports += 1;
    }

    if exports == 0 {
        return Err(ScriptError::NoExports);
    }

    Ok(SwarmEnvironment { variables })
}

/// Fetches a machine's connection config and derives the environment.
///
/// # Errors
///
/// Returns [`EnvironmentError::Fetch`] when the provider call fails and
/// [`EnvironmentError::Parse`] when the returned script is malformed.
pub async fn build_environment<P>(
    provider: &P,
    ambient: &EnvMap,
    name: &str,
    scope: ConnectionScope,
) -> Result<SwarmEnvironment, EnvironmentError<P::Error>>
where
    P: MachineProvider,
{
    let config = provider
        .connection_config(name, scope)
        .await
        .map_err(|source| EnvironmentError::Fetch {
            name: name.to_owned(),
            source,
        })?;
    Ok(derive(ambient, &config)?)
}

fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
        })
        .unwrap_or(trimmed)
}
