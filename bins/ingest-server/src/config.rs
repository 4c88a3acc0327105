use clap::{Args, Parser, Subcommand};

/// 9999-12-31T23:59:59Z.
const MAX_EPOCH_SECONDS: i64 = 253_402_300_799;

#[derive(Parser)]
#[command(name = "ingest-server", about = "Stamps tenant ids onto streamed JSON records")]
pub struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, global = true, default_value = "ingest.toml", env = "INGEST_CONFIG")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline until the source ends or Ctrl+C.
    Run,
    /// Load and validate the configuration, then exit.
    Validate,
    /// Enrich a single JSON object read from stdin.
    Enrich(EnrichArgs),
}

#[derive(Args, Clone, Debug)]
pub struct EnrichArgs {
    /// Tenant id to stamp (normally the partition key).
    #[arg(long)]
    pub tenant: String,

    /// Enrichment time in Unix seconds. Defaults to now.
    #[arg(
        long,
        allow_negative_numbers = true,
        value_parser = clap::value_parser!(i64).range(-MAX_EPOCH_SECONDS..=MAX_EPOCH_SECONDS)
    )]
    pub now: Option<i64>,

    /// Name of the tenant field.
    #[arg(long, default_value = ingest_engine::enrich::DEFAULT_TENANT_FIELD)]
    pub tenant_field: String,

    /// Name of the timestamp field.
    #[arg(long, default_value = ingest_engine::enrich::DEFAULT_TIMESTAMP_FIELD)]
    pub timestamp_field: String,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_enrich_args() {
        let cli = Cli::try_parse_from(["ingest-server", "enrich", "--tenant", "acme", "--now", "-5"]).unwrap();
        assert_eq!(cli.config, "ingest.toml");
        match cli.command {
            Commands::Enrich(args) => {
                assert_eq!(args.tenant, "acme");
                assert_eq!(args.now, Some(-5));
                assert_eq!(args.tenant_field, "TenantId");
            }
            _ => panic!("expected enrich"),
        }
    }

    #[test]
    fn now_out_of_range_is_rejected() {
        for now in ["-9223372036854775808", "9223372036854775807", "253402300800"] {
            let parsed = Cli::try_parse_from(["ingest-server", "enrich", "--tenant", "t", "--now", now]);
            assert!(parsed.is_err(), "{now}");
        }
        let cli = Cli::try_parse_from(["ingest-server", "enrich", "--tenant", "t", "--now", "-253402300799"]).unwrap();
        assert!(matches!(cli.command, Commands::Enrich(EnrichArgs { now: Some(-253_402_300_799), .. })));
    }

    #[test]
    fn config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["ingest-server", "validate", "--config", "prod.toml"]).unwrap();
        assert_eq!(cli.config, "prod.toml");
        assert!(matches!(cli.command, Commands::Validate));
    }
}
