use yodel::application::ports::{CallCallbacks, CharacteristicId, PeerId};
use yodel::config::Config;
use yodel::domain::bearer::{BearerFeatures, Technology, TerminateReason, AGGREGATE_INDEX};
use yodel::infrastructure::{LoopbackAttributeServer, TokioScheduler};
use yodel::{CallControlEngine, RegisterParams};

use tokio::runtime::Handle;
use tracing::{info, Level};

struct DemoCallbacks;

impl CallCallbacks for DemoCallbacks {
    fn authorize(&mut self, peer: PeerId) -> bool {
        info!(%peer, "Authorizing peer");
        true
    }

    fn call_accepted(&mut self, peer: Option<PeerId>, call_index: u8) {
        info!(?peer, call_index, "Call accepted");
    }

    fn call_terminated(&mut self, peer: Option<PeerId>, call_index: u8, reason: TerminateReason) {
        info!(?peer, call_index, %reason, "Call terminated");
    }

    fn call_held(&mut self, peer: Option<PeerId>, call_index: u8) {
        info!(?peer, call_index, "Call held");
    }

    fn call_originated(&mut self, peer: Option<PeerId>, call_index: u8, uri: &str) -> bool {
        info!(?peer, call_index, uri, "Call originated, remote party reached");
        true
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting Yodel call-control engine");

    // Load configuration
    let config = Config::load(None)?;
    info!("Configuration loaded: {:?}", config);

    // Demo: drive a few calls through the engine to verify the model
    demo_call_lifecycle(config).await?;

    info!("Yodel engine demo finished");
    Ok(())
}

async fn demo_call_lifecycle(config: Config) -> anyhow::Result<()> {
    let (scheduler, mut timer_rx) = TokioScheduler::new(Handle::current());
    let server = LoopbackAttributeServer::new();

    let mut engine =
        CallControlEngine::new(config.engine, Box::new(server), Box::new(scheduler));
    engine.register_callbacks(Box::new(DemoCallbacks));

    // The aggregate goes first, then one cellular bearer.
    engine.register(RegisterParams {
        provider_name: "Yodel Aggregate".into(),
        uci: "un000".into(),
        uri_schemes: vec!["tel".into()],
        technology: Technology::Lte,
        features: BearerFeatures::all(),
        aggregate: true,
        authorization_required: false,
    })?;
    let bearer = engine.register(RegisterParams {
        provider_name: "Example Telco".into(),
        uci: "un001".into(),
        uri_schemes: vec!["tel".into()],
        technology: Technology::Lte,
        features: BearerFeatures::all(),
        aggregate: false,
        authorization_required: false,
    })?;
    info!(bearer, "Demo bearer registered");

    let peer = PeerId::new(1);
    engine.subscription_changed(bearer, CharacteristicId::CallState, true);
    engine.subscription_changed(AGGREGATE_INDEX, CharacteristicId::CallState, true);

    // An incoming call, accepted by the peer through the aggregate's
    // control point.
    let incoming = engine.remote_incoming(bearer, "tel:5550100", "tel:5550199", Some("Alice"))?;
    engine.write(
        peer,
        AGGREGATE_INDEX,
        CharacteristicId::ControlPoint,
        0,
        &[0x00, incoming],
    )?;

    // An outgoing call answered by the remote party; the accepted call is
    // put on hold automatically.
    let outgoing = engine.originate(bearer, "tel:5550123")?;
    engine.remote_answer(outgoing)?;

    // Signal-strength reports are coalesced through the timer.
    engine.set_signal_strength(bearer, 80)?;
    engine.set_signal_strength(bearer, 74)?;
    if let Some(fired) = timer_rx.recv().await {
        engine.signal_timer_fired(fired);
    }

    engine.terminate(outgoing)?;
    engine.remote_terminate(incoming)?;

    let report = engine.read(AGGREGATE_INDEX, CharacteristicId::CurrentCalls)?;
    info!(len = report.len(), "Aggregate current-calls report after teardown");

    Ok(())
}
