//! SparkPi smoke test submitted through the cluster's swarm endpoint.

use thiserror::Error;

use crate::exec::{CommandRunner, ExecError};
use crate::runtime::{ContainerRuntime, ContainerSpec};
use crate::swarm::SwarmEnvironment;


/// Spark distribution image used for job submission.
pub const SPARK_IMAGE: &str = "gettyimages/spark:2.0.2-hadoop-2.7";

/// Spark master endpoint as seen from inside the master's network namespace.
pub const SPARK_MASTER_URL: &str = "spark://master:7077";

/// Example class computing digits of Pi.
pub const SMOKE_TEST_CLASS: &str = "org.apache.spark.examples.SparkPi";

/// Examples jar shipped inside the Spark image.
pub const SMOKE_TEST_JAR: &str = "/usr/spark/lib/spark-examples-2.0.2-hadoop2.7.0.jar";

const MASTER_CONTAINER_NETWORK: &str = "container:master";

/// Errors surfaced while submitting the smoke test job.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SubmitError {
    /// Raised when spark-submit exits with a non-zero status.
    #[error("spark-submit exited with status {status_text}: {stderr}")]
    Failed {
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stdout captured before the failure.
        stdout: String,
        /// Stderr captured from the submission.
        stderr: String,
    },
    /// Raised when the docker client cannot be started.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Submits the SparkPi example against a running cluster.
#[derive(Clone, Debug)]
pub struct SmokeTestRunner<R: CommandRunner> {
    runtime: ContainerRuntime<R>,
}

impl<R: CommandRunner> SmokeTestRunner<R> {
    /// Creates a runner submitting through the given container runtime.
    #[must_use]
    pub const fn new(runtime: ContainerRuntime<R>) -> Self {
        Self { runtime }
    }

    /// Submits the SparkPi job and returns the captured driver output.
    ///
    /// The submission container joins the master container's network
    /// namespace, so the job reaches the master under its in-cluster name.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Failed`] when the job exits non-zero and
    /// [`SubmitError::Exec`] when the docker client cannot be started.
    pub async fn submit(&self, env: &SwarmEnvironment) -> Result<String, SubmitError> {
        let spec = ContainerSpec::new(SPARK_IMAGE)
            .network(MASTER_CONTAINER_NETWORK)
            .entrypoint("spark-submit")
            .arg("--master")
            .arg(SPARK_MASTER_URL)
            .arg("--class")
            .arg(SMOKE_TEST_CLASS)
            .arg(SMOKE_TEST_JAR);

        let output = self.runtime.run_captured(env, &spec).await?;
        if output.is_success() {
            return Ok(output.stdout);
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(SubmitError::Failed {
            status: output.code,
            status_text,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
