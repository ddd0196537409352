//! Strategy cascade for provisioning a practice site.
//!
//! Strategies are tried in priority order. The first success wins; a failure
//! is recorded and the runner moves on after a pacing delay. The last
//! strategy never touches an external service, so the cascade always ends
//! with a result. Partial artifacts of a failed strategy (a repository whose
//! deploy failed) are left in place and reported on the attempt.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use leadpipe_providers::{Hosting, ServiceSpec, SourceControl};
use leadpipe_shared::{
    LeadRecord, LeadpipeError, ProvisioningMethod, ProvisioningResult, Result, StrategyAttempt,
};
use tracing::{error, info, instrument, warn};

use crate::isolate::isolate;

// ---------------------------------------------------------------------------
// Context and strategy contract
// ---------------------------------------------------------------------------

/// Everything a strategy needs, derived once from the lead.
#[derive(Debug, Clone)]
pub struct ProvisioningContext {
    /// Repository and service name; the practice id.
    pub repo_name: String,
    pub description: String,
    pub env_vars: BTreeMap<String, String>,
}

impl ProvisioningContext {
    pub fn from_lead(lead: &LeadRecord) -> Self {
        let env_vars = BTreeMap::from([
            ("PRACTICE_ID".to_string(), lead.practice_id.to_string()),
            ("COMPANY_NAME".to_string(), lead.company.clone()),
            ("PHONE".to_string(), lead.phone.clone().unwrap_or_default()),
            ("EMAIL".to_string(), lead.email.clone().unwrap_or_default()),
            ("LOCATION".to_string(), lead.location.clone()),
            ("SERVICES".to_string(), lead.services.join(", ")),
            ("LEAD_SCORE".to_string(), lead.lead_score.to_string()),
        ]);

        Self {
            repo_name: lead.practice_id.to_string(),
            description: format!("Website for {}", lead.company),
            env_vars,
        }
    }

    fn service_spec(&self, repo: Option<String>) -> ServiceSpec {
        ServiceSpec {
            name: self.repo_name.clone(),
            repo,
            env_vars: self.env_vars.clone(),
        }
    }
}

/// What a successful strategy produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyOutput {
    pub repo_url: Option<String>,
    pub service_url: Option<String>,
}

/// Why a strategy failed, plus anything it left behind.
#[derive(Debug)]
pub struct StrategyFailure {
    pub error: LeadpipeError,
    pub partial_repo_url: Option<String>,
}

impl From<LeadpipeError> for StrategyFailure {
    fn from(error: LeadpipeError) -> Self {
        Self {
            error,
            partial_repo_url: None,
        }
    }
}

/// One way of getting a practice site online.
#[async_trait]
pub trait ProvisioningStrategy: Send + Sync {
    fn method(&self) -> ProvisioningMethod;

    /// Whether the strategy calls any external service.
    fn requires_external(&self) -> bool {
        true
    }

    async fn attempt(&self, ctx: &ProvisioningContext) -> std::result::Result<StrategyOutput, StrategyFailure>;
}

/// Bound an external call by `timeout`.
async fn timed<T>(operation: &str, timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| LeadpipeError::timeout(operation, timeout))?
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Create a fresh repository, then deploy from it.
pub struct FullCreate {
    source_control: Arc<dyn SourceControl>,
    hosting: Arc<dyn Hosting>,
    timeout: Duration,
}

impl FullCreate {
    pub fn new(source_control: Arc<dyn SourceControl>, hosting: Arc<dyn Hosting>, timeout: Duration) -> Self {
        Self {
            source_control,
            hosting,
            timeout,
        }
    }
}

#[async_trait]
impl ProvisioningStrategy for FullCreate {
    fn method(&self) -> ProvisioningMethod {
        ProvisioningMethod::FullCreate
    }

    async fn attempt(&self, ctx: &ProvisioningContext) -> std::result::Result<StrategyOutput, StrategyFailure> {
        let repo_url = timed(
            "create repository",
            self.timeout,
            self.source_control.create_repo(&ctx.repo_name, &ctx.description),
        )
        .await?;

        let spec = ctx.service_spec(Some(repo_url.clone()));
        match timed("create service", self.timeout, self.hosting.create_service(&spec)).await {
            Ok(service_url) => Ok(StrategyOutput {
                repo_url: Some(repo_url),
                service_url: Some(service_url),
            }),
            Err(error) => Err(StrategyFailure {
                error,
                partial_repo_url: Some(repo_url),
            }),
        }
    }
}

/// Deploy from an existing template repository.
pub struct ReuseRepo {
    source_control: Arc<dyn SourceControl>,
    hosting: Arc<dyn Hosting>,
    template_repo: String,
    timeout: Duration,
}

impl ReuseRepo {
    pub fn new(
        source_control: Arc<dyn SourceControl>,
        hosting: Arc<dyn Hosting>,
        template_repo: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            source_control,
            hosting,
            template_repo: template_repo.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProvisioningStrategy for ReuseRepo {
    fn method(&self) -> ProvisioningMethod {
        ProvisioningMethod::ReuseRepo
    }

    async fn attempt(&self, ctx: &ProvisioningContext) -> std::result::Result<StrategyOutput, StrategyFailure> {
        let repo_url = timed(
            "find repository",
            self.timeout,
            self.source_control.find_repo(&self.template_repo),
        )
        .await?
        .ok_or_else(|| {
            LeadpipeError::validation(format!("template repository '{}' not found", self.template_repo))
        })?;

        let spec = ctx.service_spec(Some(repo_url.clone()));
        let service_url = timed("create service", self.timeout, self.hosting.create_service(&spec)).await?;
        Ok(StrategyOutput {
            repo_url: Some(repo_url),
            service_url: Some(service_url),
        })
    }
}

/// Deploy the prebuilt site image with no repository.
pub struct DeployWithoutRepo {
    hosting: Arc<dyn Hosting>,
    timeout: Duration,
}

impl DeployWithoutRepo {
    pub fn new(hosting: Arc<dyn Hosting>, timeout: Duration) -> Self {
        Self { hosting, timeout }
    }
}

#[async_trait]
impl ProvisioningStrategy for DeployWithoutRepo {
    fn method(&self) -> ProvisioningMethod {
        ProvisioningMethod::DeployWithoutRepo
    }

    async fn attempt(&self, ctx: &ProvisioningContext) -> std::result::Result<StrategyOutput, StrategyFailure> {
        let spec = ctx.service_spec(None);
        let service_url = timed("create service", self.timeout, self.hosting.create_service(&spec)).await?;
        Ok(StrategyOutput {
            repo_url: None,
            service_url: Some(service_url),
        })
    }
}

/// Terminal strategy: a synthetic deployment with no external dependency.
pub struct MockDeployment;

/// Host used for synthetic deployment URLs.
pub const MOCK_HOST_SUFFIX: &str = "mock.invalid";

#[async_trait]
impl ProvisioningStrategy for MockDeployment {
    fn method(&self) -> ProvisioningMethod {
        ProvisioningMethod::Mock
    }

    fn requires_external(&self) -> bool {
        false
    }

    async fn attempt(&self, ctx: &ProvisioningContext) -> std::result::Result<StrategyOutput, StrategyFailure> {
        Ok(StrategyOutput {
            repo_url: None,
            service_url: Some(format!("https://{}.{MOCK_HOST_SUFFIX}", ctx.repo_name)),
        })
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs strategies in order until one succeeds.
pub struct CascadeRunner {
    strategies: Vec<Arc<dyn ProvisioningStrategy>>,
    pacing: Duration,
}

impl CascadeRunner {
    /// Build a runner over `strategies`, appending [`MockDeployment`] unless the
    /// last strategy already needs no external service.
    pub fn new(mut strategies: Vec<Arc<dyn ProvisioningStrategy>>, pacing: Duration) -> Self {
        if strategies.last().is_none_or(|s| s.requires_external()) {
            strategies.push(Arc::new(MockDeployment));
        }
        Self { strategies, pacing }
    }

    /// The standard order: full create, reuse template, image deploy, mock.
    pub fn standard(
        source_control: Arc<dyn SourceControl>,
        hosting: Arc<dyn Hosting>,
        template_repo: &str,
        call_timeout: Duration,
        pacing: Duration,
    ) -> Self {
        Self::new(
            vec![
                Arc::new(FullCreate::new(source_control.clone(), hosting.clone(), call_timeout)),
                Arc::new(ReuseRepo::new(source_control, hosting.clone(), template_repo, call_timeout)),
                Arc::new(DeployWithoutRepo::new(hosting, call_timeout)),
                Arc::new(MockDeployment),
            ],
            pacing,
        )
    }

    pub fn methods(&self) -> Vec<ProvisioningMethod> {
        self.strategies.iter().map(|s| s.method()).collect()
    }

    /// Provision a site for `lead`. Never fails outward; exhaustion is
    /// reported as [`ProvisioningMethod::AllFailed`].
    #[instrument(skip_all, fields(practice_id = %lead.practice_id))]
    pub async fn provision(&self, lead: &LeadRecord) -> ProvisioningResult {
        let ctx = ProvisioningContext::from_lead(lead);
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for (i, strategy) in self.strategies.iter().enumerate() {
            if i > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let method = strategy.method();
            let started = Instant::now();
            let outcome = isolate(strategy.attempt(&ctx)).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match outcome {
                Ok(Ok(output)) => {
                    info!(%method, elapsed_ms, "provisioning strategy succeeded");
                    attempts.push(StrategyAttempt {
                        method,
                        success: true,
                        category: None,
                        error: None,
                        partial_repo_url: None,
                        elapsed_ms,
                    });
                    return ProvisioningResult {
                        method,
                        success: true,
                        repo_url: output.repo_url,
                        service_url: output.service_url,
                        error: None,
                        attempts,
                    };
                }
                Ok(Err(failure)) => {
                    let category = failure.error.category();
                    warn!(%method, %category, error = %failure.error, "provisioning strategy failed");
                    attempts.push(StrategyAttempt {
                        method,
                        success: false,
                        category: Some(category),
                        error: Some(failure.error.to_string()),
                        partial_repo_url: failure.partial_repo_url,
                        elapsed_ms,
                    });
                }
                Err(panic) => {
                    error!(%method, %panic, "provisioning strategy panicked");
                    attempts.push(StrategyAttempt {
                        method,
                        success: false,
                        category: Some(leadpipe_shared::FailureCategory::Internal),
                        error: Some(format!("strategy panicked: {panic}")),
                        partial_repo_url: None,
                        elapsed_ms,
                    });
                }
            }
        }

        let last_error = attempts
            .last()
            .and_then(|a| a.error.clone())
            .unwrap_or_else(|| "no provisioning strategies configured".into());
        error!(attempts = attempts.len(), "provisioning cascade exhausted");
        ProvisioningResult {
            method: ProvisioningMethod::AllFailed,
            success: false,
            repo_url: None,
            service_url: None,
            error: Some(last_error),
            attempts,
        }
    }
}
