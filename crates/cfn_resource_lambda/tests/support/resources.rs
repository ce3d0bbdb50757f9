use anyhow::{anyhow, Context as _};
use cfn_resource_lambda::handlers::context::InvocationContext;
use cfn_resource_lambda::handlers::resource::{CustomResource, OperationResult};
use serde_json::Value;

/// Sums numeric-string properties, like the `sum_resource` binary.
#[derive(Debug, Default)]
pub struct Adder;

impl Adder {
    fn sum(ctx: &InvocationContext) -> anyhow::Result<f64> {
        ctx.properties()
            .iter()
            .filter(|(key, _)| key.as_str() != "ServiceToken")
            .map(|(key, value)| {
                value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string())
                    .parse::<f64>()
                    .with_context(|| format!("property {key} is not a number"))
            })
            .sum()
    }
}

impl CustomResource for Adder {
    fn create(&mut self, ctx: &mut InvocationContext) -> OperationResult {
        Ok(Some(serde_json::json!({ "sum": Self::sum(ctx)? })))
    }

    fn update(&mut self, ctx: &mut InvocationContext) -> OperationResult {
        Ok(Some(serde_json::json!({ "sum": Self::sum(ctx)? })))
    }

    fn delete(&mut self, _ctx: &mut InvocationContext) -> OperationResult {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    Return(Option<Value>),
    Fail(&'static str),
    Panic(&'static str),
    ReportFailure(&'static str),
    ReplacePhysicalId(&'static str),
    FailValidation(&'static str),
    MaskOutputs(Value),
}

/// Does the same thing for every lifecycle operation.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub behavior: Behavior,
}

impl Scripted {
    pub fn new(behavior: Behavior) -> Self {
        Self { behavior }
    }

    fn run(&mut self, ctx: &mut InvocationContext) -> OperationResult {
        match &self.behavior {
            Behavior::Return(value) => Ok(value.clone()),
            Behavior::Fail(message) => Err(anyhow!(*message)),
            Behavior::Panic(message) => panic!("{message}"),
            Behavior::ReportFailure(reason) => {
                ctx.report_failure(*reason);
                Ok(None)
            }
            Behavior::ReplacePhysicalId(id) => {
                ctx.physical_resource_id = Some(id.to_string());
                Ok(None)
            }
            Behavior::FailValidation(_) => Ok(None),
            Behavior::MaskOutputs(value) => Ok(Some(value.clone())),
        }
    }
}

impl CustomResource for Scripted {
    fn resource_name(&self) -> String {
        "Scripted".to_string()
    }

    fn validate(&mut self, _ctx: &InvocationContext) -> anyhow::Result<()> {
        match &self.behavior {
            Behavior::FailValidation(message) => Err(anyhow!(*message)),
            _ => Ok(()),
        }
    }

    fn populate(&mut self, ctx: &mut InvocationContext) -> anyhow::Result<()> {
        if let Behavior::MaskOutputs(_) = self.behavior {
            ctx.no_echo = true;
        }
        Ok(())
    }

    fn create(&mut self, ctx: &mut InvocationContext) -> OperationResult {
        self.run(ctx)
    }

    fn update(&mut self, ctx: &mut InvocationContext) -> OperationResult {
        self.run(ctx)
    }

    fn delete(&mut self, ctx: &mut InvocationContext) -> OperationResult {
        self.run(ctx)
    }
}
