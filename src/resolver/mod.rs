//! Bounded polling of the cloud inventory for instance addresses.
//!
//! This is the only place retry and backoff logic lives. An unknown machine
//! name fails immediately, while a known instance that has not reached the
//! running state is polled up to the attempt budget.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use crate::inventory::InstanceInventory;


const RESOLVE_MAX_ATTEMPTS: u32 = 30;
const RESOLVE_BACKOFF: Duration = Duration::from_secs(10);

/// Which address field to read from a running instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressKind {
    /// Private IPv4 address used inside the cluster network.
    Private,
    /// Public DNS name used for operator-facing endpoints.
    Public,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Private => "private IP",
            Self::Public => "public DNS",
        };
        f.write_str(text)
    }
}

/// Errors surfaced while resolving an instance address.
#[derive(Debug, Error)]
pub enum ResolutionError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the inventory has no record of the machine name.
    #[error("no instance named {name} is known to the cloud inventory")]
    NotFound {
        /// Machine name that was queried.
        name: String,
    },
    /// Raised when the instance never reached the running state within the
    /// attempt budget.
    #[error("instance {name} was not running after {attempts} checks")]
    NotRunning {
        /// Machine name that was queried.
        name: String,
        /// Number of inventory checks issued before giving up.
        attempts: u32,
    },
    /// Raised when the instance is running but the requested address field is
    /// not assigned.
    #[error("instance {name} is running but has no {kind} address")]
    MissingAddress {
        /// Machine name that was queried.
        name: String,
        /// Address field that was requested.
        kind: AddressKind,
    },
    /// Raised when an inventory query itself fails.
    #[error("cloud inventory query failed")]
    Query(#[source] E),
}

/// Polls the cloud inventory until an instance address becomes available.
#[derive(Clone, Debug)]
pub struct AddressResolver<I> {
    inventory: I,
    max_attempts: u32,
    backoff: Duration,
}

impl<I> AddressResolver<I>
where
    I: InstanceInventory,
{
    /// Creates a resolver with the default attempt budget and backoff.
    #[must_use]
    pub const fn new(inventory: I) -> Self {
        Self {
            inventory,
            max_attempts: RESOLVE_MAX_ATTEMPTS,
            backoff: RESOLVE_BACKOFF,
        }
    }

    /// Overrides the attempt budget.
    ///
    /// This is primarily used by tests to keep exhaustion scenarios fast.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Overrides the backoff between inventory checks.
    ///
    /// This is primarily used by tests to keep polling scenarios fast.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Resolves the requested address for `name`, polling while the instance
    /// is booting.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError::NotFound`] without retrying when the name is
    /// unknown, [`ResolutionError::NotRunning`] when the attempt budget is
    /// exhausted before the instance runs, [`ResolutionError::MissingAddress`]
    /// when it runs without the requested field, and
    /// [`ResolutionError::Query`] when the inventory cannot be queried.
    pub async fn resolve(
        &self,
        name: &str,
        kind: AddressKind,
    ) -> Result<String, ResolutionError<I::Error>> {
        let mut saw_running = false;

        for attempt in 1..=self.max_attempts {
            // An unknown name never heals; report it without burning the
            // attempt budget.
            let Some(record) = self
                .inventory
                .describe_instance(name)
                .await
                .map_err(ResolutionError::Query)?
            else {
                return Err(ResolutionError::NotFound {
                    name: name.to_owned(),
                });
            };

            if record.is_running() {
                saw_running = true;
                let assigned = match kind {
                    AddressKind::Private => record.private_ip,
                    AddressKind::Public => record.public_dns,
                };
                if let Some(address) = assigned {
                    return Ok(address);
                }
            }

            if attempt < self.max_attempts {
                sleep(self.backoff).await;
            }
        }

        if saw_running {
            return Err(ResolutionError::MissingAddress {
                name: name.to_owned(),
                kind,
            });
        }

        Err(ResolutionError::NotRunning {
            name: name.to_owned(),
            attempts: self.max_attempts,
        })
    }
}
