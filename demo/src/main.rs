use multichain_core::error::SequencerError;
use multichain_demo::{LogFormat, config, run};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::get_config()?;

    let subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to debug for our crates if RUST_LOG is not set
            "multichain_demo=debug,multichain_sequencer=debug,multichain_aa_core=debug,multichain_eip7702_core=debug"
                .into()
        }),
    );

    match config.log_format {
        LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }

    match run(&config).await {
        Ok(result) => {
            for chain in &result.chains {
                tracing::info!(
                    chain_id = chain.chain_id,
                    chain = %chain.chain_name,
                    status = %chain.status.status,
                    calls = chain.call_count,
                    link = chain.explorer_link.as_deref().unwrap_or("-"),
                    "Chain finished"
                );
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(err) => {
            if let Some(sequencer_error) = err.downcast_ref::<SequencerError>() {
                tracing::error!(
                    error = %serde_json::to_string(sequencer_error)?,
                    "Multi-chain submission failed"
                );
            }
            Err(err)
        }
    }
}
