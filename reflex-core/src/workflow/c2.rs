//! Command-and-control workflows.
//!
//! Both variants run the full containment plan; they differ in name and in
//! how the threat is described to the forensics team.

use super::{ContainmentPlan, ContainmentWorkflow, WorkflowContext, WorkflowReport};
use crate::error::ReflexError;
use crate::finding::Finding;
use async_trait::async_trait;
use futures::future::BoxFuture;

/// Handles `Backdoor:EC2/C&CActivity.B`: the instance talked to a known
/// command-and-control IP.
pub struct C2ActivityWorkflow {
    plan: ContainmentPlan,
}

impl C2ActivityWorkflow {
    pub const NAME: &'static str = "c2-activity";
    const THREAT_SUMMARY: &'static str = "An active C2 threat was detected and remediated.";

    pub async fn build(finding: Finding, ctx: &WorkflowContext) -> Result<Self, ReflexError> {
        let plan = ContainmentPlan::prepare(Self::NAME, Self::THREAT_SUMMARY, finding, ctx).await?;
        Ok(Self { plan })
    }

    /// Registry constructor.
    pub fn construct(
        finding: Finding,
        ctx: WorkflowContext,
    ) -> BoxFuture<'static, Result<Box<dyn ContainmentWorkflow>, ReflexError>> {
        Box::pin(async move {
            let workflow = Self::build(finding, &ctx).await?;
            Ok(Box::new(workflow) as Box<dyn ContainmentWorkflow>)
        })
    }

    pub fn plan(&self) -> &ContainmentPlan {
        &self.plan
    }
}

#[async_trait]
impl ContainmentWorkflow for C2ActivityWorkflow {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn finding(&self) -> &Finding {
        self.plan.finding()
    }

    async fn execute(&self) -> Result<WorkflowReport, ReflexError> {
        Ok(self.plan.run().await)
    }
}

/// Handles `Backdoor:EC2/C&CActivity.B!DNS`: the instance resolved a known
/// command-and-control domain.
pub struct C2DnsActivityWorkflow {
    plan: ContainmentPlan,
}

impl C2DnsActivityWorkflow {
    pub const NAME: &'static str = "c2-dns-activity";
    const THREAT_SUMMARY: &'static str =
        "DNS queries to a known C2 domain were detected and the instance was remediated.";

    pub async fn build(finding: Finding, ctx: &WorkflowContext) -> Result<Self, ReflexError> {
        let plan = ContainmentPlan::prepare(Self::NAME, Self::THREAT_SUMMARY, finding, ctx).await?;
        Ok(Self { plan })
    }

    /// Registry constructor.
    pub fn construct(
        finding: Finding,
        ctx: WorkflowContext,
    ) -> BoxFuture<'static, Result<Box<dyn ContainmentWorkflow>, ReflexError>> {
        Box::pin(async move {
            let workflow = Self::build(finding, &ctx).await?;
            Ok(Box::new(workflow) as Box<dyn ContainmentWorkflow>)
        })
    }

    pub fn plan(&self) -> &ContainmentPlan {
        &self.plan
    }
}

#[async_trait]
impl ContainmentWorkflow for C2DnsActivityWorkflow {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn finding(&self) -> &Finding {
        self.plan.finding()
    }

    async fn execute(&self) -> Result<WorkflowReport, ReflexError> {
        Ok(self.plan.run().await)
    }
}
