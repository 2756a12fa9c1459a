//! Serialized polling of the gateway, driven by a ticker and by scrapes.

use crate::error::Result;
use crate::exporter::GatewayExporter;
use crate::gateway_client::GatewayClient;
use crate::model::{project, FixedInfo};
use crate::registry::MetricsRegistry;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Content type of the Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Body of a `/metrics` response when the poll fails.
pub const SCRAPE_FAILED: &str = "polling the gateway failed\n";

struct PollState {
    client: GatewayClient,
    fixed: Arc<FixedInfo>,
    registry: MetricsRegistry,
    exporter: GatewayExporter,
}

/// Owns the gateway session and every metric. Cloning shares the same state.
#[derive(Clone)]
pub struct PollEngine {
    state: Arc<Mutex<PollState>>,
}

impl PollEngine {
    /// Registers the instruments under `namespace_subsystem_` and records the
    /// fixed site attributes. Does not poll.
    pub fn new(
        client: GatewayClient,
        fixed: FixedInfo,
        namespace: &str,
        subsystem: &str,
    ) -> Result<Self> {
        let mut registry = MetricsRegistry::new(namespace, subsystem);
        let exporter = GatewayExporter::new(&mut registry, &fixed)?;
        Ok(Self {
            state: Arc::new(Mutex::new(PollState {
                client,
                fixed: Arc::new(fixed),
                registry,
                exporter,
            })),
        })
    }

    /// Reads the fixed info, registers instruments and runs the first poll.
    /// Any failure here means the exporter cannot start.
    pub async fn start(client: GatewayClient, namespace: &str, subsystem: &str) -> Result<Self> {
        let fixed = client.fetch_fixed_info().await?;
        let engine = Self::new(client, fixed, namespace, subsystem)?;
        engine.poll().await?;
        info!("First poll succeeded");
        Ok(engine)
    }

    /// Runs one poll cycle and returns the rendered exposition.
    ///
    /// Only one poll runs at a time; a caller arriving mid-poll waits and then
    /// runs its own. Metrics are only written once the whole snapshot has been
    /// fetched and projected, so a failed poll leaves them untouched.
    pub async fn poll(&self) -> Result<String> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let snapshot = state.client.fetch_snapshot().await?;
        let metrics = project(&snapshot, &state.fixed)?;
        state.exporter.update(&mut state.registry, &metrics)?;
        debug!(
            charge = metrics.powerwall_charge_percent,
            grid_connected = metrics.grid_connected,
            "Poll complete"
        );
        Ok(state.registry.render())
    }

    /// Latest exposition without polling.
    pub async fn render(&self) -> String {
        self.state.lock().await.registry.render()
    }

    /// Polls every `period` in the background. The first tick is skipped since
    /// startup already polled. Failures are logged and the ticker keeps going.
    pub fn spawn_ticker(&self, period: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = engine.poll().await {
                    error!("Scheduled poll failed: {}", e);
                }
            }
        })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(redirect_to_metrics))
            .route("/metrics", get(metrics))
            .route("/healthz", get(health))
            .with_state(self.clone())
    }
}

async fn metrics(State(engine): State<PollEngine>) -> Response {
    match engine.poll().await {
        Ok(body) => ([(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            // The error can carry a whole gateway response; keep it in the log.
            error!("Poll for scrape failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, SCRAPE_FAILED).into_response()
        }
    }
}

async fn redirect_to_metrics() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/metrics")])
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::counters::Direction;
    use crate::gateway_api::{fixtures, Endpoint};
    use crate::gateway_client::test_support::{mock_endpoint, mock_login};
    use crate::model::Meter;
    use axum::body::Body;
    use axum::http::Request;
    use mockito::{Mock, ServerGuard};
    use tower::ServiceExt;

    const SNAPSHOT_ENDPOINTS: [Endpoint; 8] = [
        Endpoint::Networks,
        Endpoint::Operation,
        Endpoint::Status,
        Endpoint::Powerwalls,
        Endpoint::SiteMaster,
        Endpoint::Aggregates,
        Endpoint::Soe,
        Endpoint::GridStatus,
    ];

    const FIXED_ENDPOINTS: [Endpoint; 3] = [Endpoint::SiteInfo, Endpoint::Config, Endpoint::Solars];

    async fn gateway() -> (ServerGuard, Vec<Mock>) {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = vec![mock_login(&mut server)];
        for endpoint in FIXED_ENDPOINTS.into_iter().chain(SNAPSHOT_ENDPOINTS) {
            mocks.push(mock_endpoint(&mut server, endpoint));
        }
        (server, mocks)
    }

    async fn started(server: &ServerGuard) -> PollEngine {
        let credentials = Credentials {
            email: "owner@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let client = GatewayClient::connect(&server.url(), &credentials)
            .await
            .unwrap();
        PollEngine::start(client, "tesla", "energy_gateway")
            .await
            .unwrap()
    }

    async fn get_path(engine: &PollEngine, path: &str) -> Response {
        engine
            .router()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_start_polls_once() {
        let (server, _mocks) = gateway().await;
        let engine = started(&server).await;

        let text = engine.render().await;
        assert!(text.contains("tesla_energy_gateway_num_powerwalls 2\n"));
        assert!(text.contains("tesla_energy_gateway_grid_connected 1\n"));
    }

    #[tokio::test]
    async fn test_start_fails_when_first_poll_fails() {
        let mut server = mockito::Server::new_async().await;
        let _login = mock_login(&mut server);
        let _fixed: Vec<_> = FIXED_ENDPOINTS
            .into_iter()
            .chain([Endpoint::Powerwalls])
            .map(|endpoint| mock_endpoint(&mut server, endpoint))
            .collect();
        let _down = server
            .mock("GET", "/networks")
            .with_status(502)
            .create();

        let credentials = Credentials {
            email: "owner@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let client = GatewayClient::connect(&server.url(), &credentials)
            .await
            .unwrap();
        let result = PollEngine::start(client, "tesla", "energy_gateway").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_metrics_route_polls() {
        let (server, mocks) = gateway().await;
        let engine = started(&server).await;

        let response = get_path(&engine, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            EXPOSITION_CONTENT_TYPE
        );
        let text = body_text(response).await;
        assert!(text.contains("# TYPE tesla_energy_gateway_cumulative_power counter\n"));
        assert!(text.contains(
            "tesla_energy_gateway_instant_power{meter=\"load\",powerType=\"truePower\"}"
        ));
        for mock in mocks {
            mock.assert();
        }
    }

    #[tokio::test]
    async fn test_root_redirects_and_health() {
        let (server, _mocks) = gateway().await;
        let engine = started(&server).await;

        let response = get_path(&engine, "/").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/metrics");

        let response = get_path(&engine, "/healthz").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_failed_poll_leaves_state_untouched() {
        let (mut server, _mocks) = gateway().await;
        let engine = started(&server).await;
        let before = engine.render().await;
        let last_site_import = engine
            .state
            .lock()
            .await
            .exporter
            .counter_state()
            .last(Meter::Site, Direction::Imported);

        // Aggregates would now report more energy, but grid status carries an
        // unknown token, so the whole poll must be discarded.
        let bumped = fixtures::AGGREGATES.replacen("5742.1234", "5800.0", 1);
        let _aggregates = server
            .mock("GET", "/meters/aggregates")
            .with_status(200)
            .with_body(bumped)
            .create();
        let _grid = server
            .mock("GET", "/system_status/grid_status")
            .with_status(200)
            .with_body(r#"{"grid_status": "SystemMeltdown", "grid_services_active": false}"#)
            .create();

        let response = get_path(&engine, "/metrics").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert_eq!(body, SCRAPE_FAILED);
        assert!(!body.contains("SystemMeltdown"));

        assert_eq!(engine.render().await, before);
        assert_eq!(
            engine
                .state
                .lock()
                .await
                .exporter
                .counter_state()
                .last(Meter::Site, Direction::Imported),
            last_site_import
        );
    }

    #[tokio::test]
    async fn test_concurrent_polls_are_serialized() {
        let (server, _mocks) = gateway().await;
        let engine = started(&server).await;

        let (a, b) = tokio::join!(engine.poll(), engine.poll());
        let (a, b) = (a.unwrap(), b.unwrap());
        // Identical readings: the second poll adds nothing to the counters.
        assert_eq!(a, b);
        assert!(a.contains(
            "tesla_energy_gateway_cumulative_power{meter=\"site\",direction=\"to\"} 5742.1234\n"
        ));
    }

    #[tokio::test]
    async fn test_ticker_polls_in_background() {
        let (mut server, _mocks) = gateway().await;
        let engine = started(&server).await;

        let bumped = fixtures::AGGREGATES.replacen("5742.1234", "5800.0", 1);
        let _aggregates = server
            .mock("GET", "/meters/aggregates")
            .with_status(200)
            .with_body(bumped)
            .expect_at_least(1)
            .create();

        let ticker = engine.spawn_ticker(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        ticker.abort();

        let last = engine
            .state
            .lock()
            .await
            .exporter
            .counter_state()
            .last(Meter::Site, Direction::Imported);
        assert_eq!(last, 5800.0);
    }
}
