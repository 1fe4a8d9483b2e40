//! The provisioning command sequence.

use std::fmt;

use rtkbridge_receiver::commands::{self, classify_response};
use rtkbridge_receiver::{COMMAND_TIMEOUT, ReceiverError, ReceiverLink};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::error::ProvisioningError;
use crate::settings::{NtripMode, ProvisioningConfig};

/// One step of the provisioning sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Verify,
    Login,
    EnableOutput,
    StreamOutput,
    NtripSettings,
    Confirm,
    Persist,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Verify => "verify",
            Step::Login => "login",
            Step::EnableOutput => "enable-output",
            Step::StreamOutput => "stream-output",
            Step::NtripSettings => "ntrip-settings",
            Step::Confirm => "confirm",
            Step::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// How a completed step went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Confirmed,
    /// The receiver did not clearly acknowledge the step; the run went on.
    Unconfirmed(String),
    Skipped,
}

/// Per-step record of a successful provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningReport {
    pub steps: Vec<(Step, StepOutcome)>,
}

impl ProvisioningReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    /// `true` if no step ended unconfirmed.
    pub fn fully_confirmed(&self) -> bool {
        !self
            .steps
            .iter()
            .any(|(_, o)| matches!(o, StepOutcome::Unconfirmed(_)))
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Confirmed => info!(%step, "provisioning step confirmed"),
            StepOutcome::Unconfirmed(reason) => {
                warn!(%step, reason = %reason, "provisioning step not confirmed")
            }
            StepOutcome::Skipped => info!(%step, "provisioning step skipped"),
        }
        self.steps.push((step, outcome));
    }
}

/// Runs the provisioning sequence once against a link in command mode.
///
/// The link is borrowed exclusively for the whole run and is left at the
/// command prompt afterwards.
pub struct ConfigurationController {
    config: ProvisioningConfig,
}

impl ConfigurationController {
    pub fn new(config: ProvisioningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    pub async fn run<T>(
        &self,
        link: &mut ReceiverLink<T>,
    ) -> Result<ProvisioningReport, ProvisioningError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        self.config.ntrip.validate()?;

        let ntrip = &self.config.ntrip;
        info!(
            link = %link.name(),
            connection = %ntrip.connection,
            mode = %ntrip.mode,
            caster = %ntrip.caster,
            port = ntrip.port,
            mountpoint = %ntrip.mountpoint,
            "starting receiver provisioning"
        );

        match self.sequence(link).await {
            Ok(report) => {
                info!(
                    fully_confirmed = report.fully_confirmed(),
                    "receiver provisioning complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "receiver provisioning aborted");
                Err(e)
            }
        }
    }

    async fn sequence<T>(
        &self,
        link: &mut ReceiverLink<T>,
    ) -> Result<ProvisioningReport, ProvisioningError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let cfg = &self.config;
        let mut report = ProvisioningReport::default();

        link.enter_command_mode()
            .await
            .map_err(ProvisioningError::Link)?;

        // Verify: the only step where silence is fatal.
        let reply = send(link, &commands::get_com_settings(&cfg.output.port)).await?;
        match classify_response(&reply) {
            Ok(()) => report.record(Step::Verify, StepOutcome::Confirmed),
            Err(ReceiverError::Rejected(response)) => {
                return Err(ProvisioningError::Rejected {
                    step: Step::Verify,
                    response,
                });
            }
            Err(e) => return Err(ProvisioningError::Link(e)),
        }

        match &cfg.login {
            Some(login) => {
                self.pause().await;
                let reply = send(link, &commands::login(&login.username, &login.password)).await?;
                let outcome = if login_succeeded(&reply) {
                    StepOutcome::Confirmed
                } else {
                    StepOutcome::Unconfirmed("login not acknowledged, continuing anonymously".into())
                };
                report.record(Step::Login, outcome);
            }
            None => report.record(Step::Login, StepOutcome::Skipped),
        }

        self.pause().await;
        let reply = send(link, &cfg.output.enable_output_command()).await?;
        report.record(Step::EnableOutput, checked(Step::EnableOutput, &reply)?);

        self.pause().await;
        let reply = send(link, &cfg.output.stream_command()).await?;
        report.record(Step::StreamOutput, checked(Step::StreamOutput, &reply)?);

        self.pause().await;
        let reply = send(link, &cfg.ntrip.command()).await?;
        report.record(Step::NtripSettings, checked(Step::NtripSettings, &reply)?);

        // Only a client connection has settings worth reading back.
        if cfg.ntrip.mode == NtripMode::Client {
            self.pause().await;
            let reply = send(link, &cfg.ntrip.query_command()).await?;
            let outcome = match checked(Step::Confirm, &reply)? {
                StepOutcome::Confirmed if !reply.contains(&cfg.ntrip.mountpoint) => {
                    StepOutcome::Unconfirmed(format!(
                        "mountpoint {} not in settings reply",
                        cfg.ntrip.mountpoint
                    ))
                }
                outcome => outcome,
            };
            report.record(Step::Confirm, outcome);
        } else {
            report.record(Step::Confirm, StepOutcome::Skipped);
        }

        self.pause().await;
        let reply = send(link, commands::write_settings()).await?;
        report.record(Step::Persist, checked(Step::Persist, &reply)?);

        Ok(report)
    }

    async fn pause(&self) {
        if !self.config.step_delay.is_zero() {
            tokio::time::sleep(self.config.step_delay).await;
        }
    }
}

async fn send<T>(link: &mut ReceiverLink<T>, command: &str) -> Result<String, ProvisioningError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    link.send_command(command, COMMAND_TIMEOUT)
        .await
        .map_err(ProvisioningError::Link)
}

/// Outcome of a step after verification: rejection aborts, silence warns.
fn checked(step: Step, reply: &str) -> Result<StepOutcome, ProvisioningError> {
    match classify_response(reply) {
        Ok(()) => Ok(StepOutcome::Confirmed),
        Err(ReceiverError::Rejected(response)) => Err(ProvisioningError::Rejected { step, response }),
        Err(e) => Ok(StepOutcome::Unconfirmed(e.to_string())),
    }
}

fn login_succeeded(reply: &str) -> bool {
    reply.to_ascii_lowercase().contains("login successful") || commands::is_acknowledged(reply)
}
