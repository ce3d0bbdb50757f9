use anyhow::{bail, Context as _};
use cfn_resource_lambda::handlers::context::InvocationContext;
use cfn_resource_lambda::handlers::resource::{CustomResource, OperationResult};
use lambda_runtime::Error;
use serde_json::{json, Value};

/// `Custom::Sum`: adds up every numeric property and exposes the total as
/// the `sum` attribute. Nothing exists outside CloudFormation, so delete is
/// a no-op.
#[derive(Debug, Default)]
struct SumResource {
    addends: Vec<f64>,
}

impl CustomResource for SumResource {
    fn validate(&mut self, ctx: &InvocationContext) -> anyhow::Result<()> {
        if ctx.properties().keys().all(|key| key == "ServiceToken") {
            bail!("at least one property to sum is required");
        }
        Ok(())
    }

    fn populate(&mut self, ctx: &mut InvocationContext) -> anyhow::Result<()> {
        self.addends = ctx
            .properties()
            .iter()
            .filter(|(key, _)| key.as_str() != "ServiceToken")
            .map(|(key, value)| parse_addend(value).with_context(|| format!("property {key}")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(())
    }

    fn create(&mut self, _ctx: &mut InvocationContext) -> OperationResult {
        Ok(Some(json!({ "sum": self.total() })))
    }

    fn update(&mut self, _ctx: &mut InvocationContext) -> OperationResult {
        Ok(Some(json!({ "sum": self.total() })))
    }

    fn delete(&mut self, _ctx: &mut InvocationContext) -> OperationResult {
        Ok(None)
    }
}

impl SumResource {
    fn total(&self) -> f64 {
        self.addends.iter().sum()
    }
}

/// CloudFormation passes every property value as a string, so both numbers
/// and numeric strings are accepted.
fn parse_addend(value: &Value) -> anyhow::Result<f64> {
    match value {
        Value::Number(number) => number
            .as_f64()
            .with_context(|| format!("{number} is not representable as f64")),
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .with_context(|| format!("'{text}' is not a number")),
        other => bail!("expected a number, got {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    cfn_resource_lambda::runtime::run(SumResource::default).await
}
