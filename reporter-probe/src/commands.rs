use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reporter_datasource::{
    load_datasource_configs, task, CircuitBreakerManager, ConnectionManager, Connector,
    DatasourceRegistry, HealthChecker, HealthReport, NativeConnector, QueryService,
    RuntimeSettings,
};
use reporter_types::{DatasourceKind, DatasourceStatus};

/// Wired-up datasource subsystem for one CLI invocation.
pub struct Probe {
    settings: RuntimeSettings,
    registry: Arc<DatasourceRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    checker: Arc<HealthChecker>,
    cancel: CancellationToken,
}

impl Probe {
    /// Load configuration and connect every datasource. Failing datasources
    /// are reported, never fatal.
    pub async fn bring_up() -> Result<Self> {
        let settings = RuntimeSettings::from_env();
        let configs = load_datasource_configs();

        let registry = Arc::new(DatasourceRegistry::new());
        registry
            .initialize(configs)
            .await
            .context("Failed to initialize datasource registry")?;

        let connector: Arc<dyn Connector> =
            Arc::new(NativeConnector::new(settings.timeouts, settings.pool));
        let connections = Arc::new(ConnectionManager::new(
            Arc::clone(&registry),
            connector,
            settings.retry,
            settings.timeouts.connect,
        ));
        let breakers = Arc::new(CircuitBreakerManager::with_config(settings.breaker.clone()));
        let checker = HealthChecker::new(
            Arc::clone(&registry),
            Arc::clone(&breakers),
            Arc::clone(&connections),
            settings.health,
        );

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        task::spawn_and_forget("ctrl-c", async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                interrupt.cancel();
            }
        });

        info!("🚀 Connecting {} datasource(s)...", registry.len().await);
        for (identity, result) in connections.connect_all(&cancel).await {
            if let Err(err) = result {
                warn!(datasource = %identity, error = %err, "Datasource unavailable after startup");
            }
        }

        Ok(Self { settings, registry, breakers, checker, cancel })
    }

    async fn reports(&self) -> BTreeMap<String, HealthReport> {
        self.checker.get_health_status().await.into_iter().collect()
    }

    pub async fn status(&self, json: bool) -> Result<()> {
        let reports = self.reports().await;

        if json {
            println!("{}", serde_json::to_string_pretty(&reports)?);
            return Ok(());
        }

        if reports.is_empty() {
            println!("{}", "No datasources configured.".yellow());
            return Ok(());
        }

        let kinds: BTreeMap<String, DatasourceKind> = self
            .registry
            .get_all()
            .await
            .into_iter()
            .map(|(identity, handle)| (identity, handle.kind().clone()))
            .collect();

        println!("{}", render_status(&reports, &kinds));

        let available = reports.values().filter(|r| r.status == DatasourceStatus::Available).count();
        println!("\n{} of {} datasources available", available, reports.len());
        let summary = self.breakers.get_summary();
        println!(
            "Circuits: {} closed, {} open, {} half-open ({} trips)",
            summary.closed, summary.open, summary.half_open, summary.total_trips
        );
        Ok(())
    }

    pub async fn watch(&self) -> Result<()> {
        println!(
            "{} every {:?} (Ctrl-C to stop)",
            "Watching datasource health".cyan().bold(),
            self.settings.health.interval
        );

        self.checker.start();
        self.cancel.cancelled().await;
        self.checker.stop();
        self.checker.join().await;

        info!(reconnections = self.checker.reconnection_attempts(), "Health checker stopped");
        self.status(false).await
    }

    pub async fn schemas(&self, identity: &str) -> Result<()> {
        let service = QueryService::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.breakers),
            self.settings.timeouts,
        );

        let handle = self
            .registry
            .get(identity)
            .await
            .with_context(|| format!("datasource '{identity}' is not configured"))?;
        if *handle.kind() == DatasourceKind::Relational {
            let schemas = service.list_schemas(identity).await?;
            println!("{} {}", "Schemas:".cyan().bold(), schemas.join(", "));
        }

        let tables = service.get_database_schema(identity).await?;

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Schema", "Table", "Columns", "Primary key"]);
        for schema in tables.iter() {
            let primary: Vec<&str> = schema
                .columns
                .iter()
                .filter(|c| c.is_primary_key)
                .map(|c| c.name.as_str())
                .collect();
            table.add_row(vec![
                Cell::new(if schema.schema_name.is_empty() { "-" } else { schema.schema_name.as_str() }),
                Cell::new(&schema.table_name),
                Cell::new(schema.columns.len()),
                Cell::new(if primary.is_empty() { "-".to_string() } else { primary.join(", ") }),
            ]);
        }

        println!("{table}");
        println!("\n{} tables total", tables.len());
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.checker.stop();
        self.registry.close_all().await;
    }
}

fn status_cell(status: DatasourceStatus) -> Cell {
    let color = match status {
        DatasourceStatus::Available => Color::Green,
        DatasourceStatus::Degraded => Color::Yellow,
        DatasourceStatus::Unavailable => Color::Red,
        DatasourceStatus::Unknown => Color::Grey,
    };
    Cell::new(status).fg(color)
}

fn render_status(reports: &BTreeMap<String, HealthReport>, kinds: &BTreeMap<String, DatasourceKind>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Datasource", "Type", "Status", "Circuit", "Attempts", "Last error"]);

    for (identity, report) in reports {
        let kind = kinds.get(identity).map_or_else(|| "-".to_string(), ToString::to_string);
        table.add_row(vec![
            Cell::new(identity),
            Cell::new(kind),
            status_cell(report.status),
            Cell::new(&report.circuit),
            Cell::new(report.retry_count),
            Cell::new(report.last_error.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: DatasourceStatus, circuit: &str, last_error: Option<&str>) -> HealthReport {
        HealthReport {
            status,
            circuit: circuit.to_string(),
            initialized: status == DatasourceStatus::Available,
            last_error: last_error.map(str::to_string),
            last_attempt: None,
            retry_count: 1,
        }
    }

    #[test]
    fn test_render_status_lists_every_datasource() {
        let reports = BTreeMap::from([
            ("midaz_onboarding".to_string(), report(DatasourceStatus::Available, "closed", None)),
            (
                "legacy_ledger".to_string(),
                report(DatasourceStatus::Unavailable, "not_initialized", Some("unsupported database type: oracle")),
            ),
        ]);
        let kinds = BTreeMap::from([
            ("midaz_onboarding".to_string(), DatasourceKind::Relational),
            ("legacy_ledger".to_string(), DatasourceKind::Unsupported("oracle".to_string())),
        ]);

        let rendered = render_status(&reports, &kinds).to_string();

        assert!(rendered.contains("midaz_onboarding"));
        assert!(rendered.contains("postgresql"));
        assert!(rendered.contains("unsupported database type: oracle"));
        assert!(rendered.contains("not_initialized"));
    }
}
