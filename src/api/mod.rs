use std::fs::{self, File};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::{
    Router,
    extract::{Json, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    LedgerSnapshot, PriceSeries, RunSummary, SimError, SimulationRun, StepAnchor, StepRule,
    StrategyConfig, compare_strategies,
};
use crate::data::{CsvOptions, load_prices_csv_path, write_ledger_csv};

const DEFAULT_AMOUNT: f64 = 200.0;
const DEFAULT_BOOST_FRACTION: f64 = 0.15;
const DEFAULT_STEP_EVERY_YEARS: u32 = 5;
const DEFAULT_STEP_FACTOR: f64 = 1.1;
const DEFAULT_INDEX_NAME: &str = "S&P 500";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum StrategyKind {
    Flat,
    Boosted,
    StepUp,
}

impl StrategyKind {
    const ALL: [StrategyKind; 3] = [StrategyKind::Flat, StrategyKind::Boosted, StrategyKind::StepUp];

    fn label(self) -> &'static str {
        match self {
            StrategyKind::Flat => "flat",
            StrategyKind::Boosted => "boosted",
            StrategyKind::StepUp => "step-up",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliStrategy {
    Flat,
    Boosted,
    StepUp,
}

impl From<CliStrategy> for StrategyKind {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::Flat => StrategyKind::Flat,
            CliStrategy::Boosted => StrategyKind::Boosted,
            CliStrategy::StepUp => StrategyKind::StepUp,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliStepAnchor {
    SeriesStart,
    SkipFirstYear,
}

impl From<CliStepAnchor> for StepAnchor {
    fn from(value: CliStepAnchor) -> Self {
        match value {
            CliStepAnchor::SeriesStart => StepAnchor::SeriesStart,
            CliStepAnchor::SkipFirstYear => StepAnchor::SkipFirstYear,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliStepRule {
    Compound,
    FromBase,
}

impl From<CliStepRule> for StepRule {
    fn from(value: CliStepRule) -> Self {
        match value {
            CliStepRule::Compound => StepRule::Compound,
            CliStepRule::FromBase => StepRule::FromBase,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiStrategy {
    Flat,
    Boosted,
    StepUp,
}

impl From<ApiStrategy> for StrategyKind {
    fn from(value: ApiStrategy) -> Self {
        match value {
            ApiStrategy::Flat => StrategyKind::Flat,
            ApiStrategy::Boosted => StrategyKind::Boosted,
            ApiStrategy::StepUp => StrategyKind::StepUp,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiStepAnchor {
    SeriesStart,
    SkipFirstYear,
}

impl From<ApiStepAnchor> for StepAnchor {
    fn from(value: ApiStepAnchor) -> Self {
        match value {
            ApiStepAnchor::SeriesStart => StepAnchor::SeriesStart,
            ApiStepAnchor::SkipFirstYear => StepAnchor::SkipFirstYear,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiStepRule {
    Compound,
    FromBase,
}

impl From<ApiStepRule> for StepRule {
    fn from(value: ApiStepRule) -> Self {
        match value {
            ApiStepRule::Compound => StepRule::Compound,
            ApiStepRule::FromBase => StepRule::FromBase,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dca-sim",
    about = "Monthly index investing simulator (flat, volatility-boosted and step-up contributions)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate strategies against a CSV price history and print a JSON report.
    Run(RunArgs),
    /// Serve the simulation API over HTTP.
    Serve {
        #[arg(default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[arg(long, help = "CSV file with one row per period")]
    prices: PathBuf,
    #[arg(long, default_value = "Date")]
    date_column: String,
    #[arg(long, default_value = "Price")]
    price_column: String,
    #[arg(long, default_value = "%Y-%m-%d", help = "chrono format of the date column")]
    date_format: String,
    #[arg(
        long,
        default_value_t = 1.0,
        help = "Multiplier applied to every price, e.g. index points to currency"
    )]
    currency_scale: f64,
    #[arg(long, default_value = DEFAULT_INDEX_NAME)]
    index_name: String,
    #[arg(long, default_value_t = DEFAULT_AMOUNT, help = "Base monthly contribution")]
    amount: f64,
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [CliStrategy::Flat, CliStrategy::Boosted, CliStrategy::StepUp]
    )]
    strategies: Vec<CliStrategy>,
    #[arg(
        long,
        default_value_t = DEFAULT_BOOST_FRACTION,
        help = "Extra contribution per 5% drop bucket, in (0, 0.25]"
    )]
    boost_fraction: f64,
    #[arg(long, default_value_t = DEFAULT_STEP_EVERY_YEARS)]
    step_every_years: u32,
    #[arg(long, default_value_t = DEFAULT_STEP_FACTOR)]
    step_factor: f64,
    #[arg(long, value_enum, default_value_t = CliStepAnchor::SeriesStart)]
    step_anchor: CliStepAnchor,
    #[arg(
        long,
        value_enum,
        default_value_t = CliStepRule::Compound,
        help = "compound: each step multiplies the running base; from-base: each step rescales the original base"
    )]
    step_rule: CliStepRule,
    #[arg(long, help = "Write <label>.csv ledgers into this directory")]
    ledger_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct StrategyParams {
    amount: f64,
    boost_fraction: f64,
    step_every_years: u32,
    step_factor: f64,
    step_anchor: StepAnchor,
    step_rule: StepRule,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            amount: DEFAULT_AMOUNT,
            boost_fraction: DEFAULT_BOOST_FRACTION,
            step_every_years: DEFAULT_STEP_EVERY_YEARS,
            step_factor: DEFAULT_STEP_FACTOR,
            step_anchor: StepAnchor::SeriesStart,
            step_rule: StepRule::Compound,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct PricePoint {
    date: NaiveDate,
    price: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    index_name: Option<String>,
    prices: Vec<PricePoint>,
    currency_scale: Option<f64>,
    amount: Option<f64>,
    strategies: Option<Vec<ApiStrategy>>,
    boost_fraction: Option<f64>,
    step_every_years: Option<u32>,
    step_factor: Option<f64>,
    step_anchor: Option<ApiStepAnchor>,
    step_rule: Option<ApiStepRule>,
    include_ledger: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    label: String,
    summary: RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    ledger: Option<Vec<LedgerSnapshot>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    index_name: String,
    periods: usize,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    years_spanned: usize,
    runs: Vec<RunResponse>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Run(args) => run_cli(args),
        Command::Serve { port } => run_http_server(port)
            .await
            .context("HTTP server failed"),
    }
}

fn run_cli(args: RunArgs) -> anyhow::Result<()> {
    let options = CsvOptions {
        date_column: args.date_column.clone(),
        price_column: args.price_column.clone(),
        date_format: args.date_format.clone(),
        currency_scale: args.currency_scale,
    };
    let series = load_prices_csv_path(&args.prices, &options)
        .with_context(|| format!("load prices from {}", args.prices.display()))?;
    info!(
        periods = series.len(),
        years = series.distinct_years(),
        "loaded price series"
    );

    let kinds: Vec<StrategyKind> = args.strategies.iter().map(|&s| s.into()).collect();
    let configs = build_strategy_configs(&kinds, params_from_args(&args));
    let runs = compare_strategies(&series, &configs)?;

    for run in &runs {
        info!(
            label = %run.label,
            return_ratio = run.summary.return_ratio,
            cagr_percent = run.summary.cagr_percent,
            "strategy summary"
        );
    }

    if let Some(dir) = &args.ledger_dir {
        write_ledgers(dir, &runs)?;
    }

    let response = build_simulate_response(&args.index_name, &series, runs, false);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn params_from_args(args: &RunArgs) -> StrategyParams {
    StrategyParams {
        amount: args.amount,
        boost_fraction: args.boost_fraction,
        step_every_years: args.step_every_years,
        step_factor: args.step_factor,
        step_anchor: args.step_anchor.into(),
        step_rule: args.step_rule.into(),
    }
}

fn write_ledgers(dir: &Path, runs: &[SimulationRun]) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    for run in runs {
        let path = dir.join(format!("{}.csv", run.label));
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        write_ledger_csv(file, &run.snapshots)?;
        info!(path = %path.display(), "wrote ledger");
    }
    Ok(())
}

fn build_strategy_configs(kinds: &[StrategyKind], params: StrategyParams) -> Vec<StrategyConfig> {
    kinds
        .iter()
        .map(|&kind| match kind {
            StrategyKind::Flat => StrategyConfig::flat(kind.label(), params.amount),
            StrategyKind::Boosted => {
                StrategyConfig::volatility_boosted(kind.label(), params.amount, params.boost_fraction)
            }
            StrategyKind::StepUp => StrategyConfig::yearly_step_up(
                kind.label(),
                params.amount,
                params.step_every_years,
                params.step_factor,
                params.step_anchor,
            )
            .with_step_rule(params.step_rule),
        })
        .collect()
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!("dca-sim HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

fn router() -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .fallback(not_found_handler)
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_handler(payload: Result<Json<SimulatePayload>, JsonRejection>) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    match simulate_from_payload(payload) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn simulate_from_payload(payload: SimulatePayload) -> Result<SimulateResponse, SimError> {
    let scale = payload.currency_scale.unwrap_or(1.0);
    if !scale.is_finite() || scale <= 0.0 {
        return Err(SimError::invalid_configuration(
            "currency_scale",
            format!("must be a positive number, got {scale}"),
        ));
    }
    let series = PriceSeries::from_points(
        payload
            .prices
            .iter()
            .map(|p| (p.date, p.price * scale)),
    )?;

    let defaults = StrategyParams::default();
    let params = StrategyParams {
        amount: payload.amount.unwrap_or(defaults.amount),
        boost_fraction: payload.boost_fraction.unwrap_or(defaults.boost_fraction),
        step_every_years: payload.step_every_years.unwrap_or(defaults.step_every_years),
        step_factor: payload.step_factor.unwrap_or(defaults.step_factor),
        step_anchor: payload
            .step_anchor
            .map(StepAnchor::from)
            .unwrap_or(defaults.step_anchor),
        step_rule: payload
            .step_rule
            .map(StepRule::from)
            .unwrap_or(defaults.step_rule),
    };
    let kinds: Vec<StrategyKind> = match payload.strategies {
        Some(list) => list.into_iter().map(StrategyKind::from).collect(),
        None => StrategyKind::ALL.to_vec(),
    };

    let configs = build_strategy_configs(&kinds, params);
    let runs = compare_strategies(&series, &configs)?;
    let index_name = payload
        .index_name
        .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string());

    Ok(build_simulate_response(
        &index_name,
        &series,
        runs,
        payload.include_ledger.unwrap_or(false),
    ))
}

fn build_simulate_response(
    index_name: &str,
    series: &PriceSeries,
    runs: Vec<SimulationRun>,
    include_ledger: bool,
) -> SimulateResponse {
    SimulateResponse {
        index_name: index_name.to_string(),
        periods: series.len(),
        first_date: series.first().map(|o| o.date),
        last_date: series.last().map(|o| o.date),
        years_spanned: series.distinct_years(),
        runs: runs
            .into_iter()
            .map(|run| RunResponse {
                label: run.label,
                summary: run.summary,
                ledger: include_ledger.then_some(run.snapshots),
            })
            .collect(),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
