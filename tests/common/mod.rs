//! Shared harness for integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::Value;
use tower::ServiceExt;

use commerce_fulfillment::api;
use commerce_fulfillment::app_state::AppState;
use commerce_fulfillment::auth::{Actor, IdentityVerifier, JwtVerifier, Role};
use commerce_fulfillment::domain::{
    EventBus, EventId, Product, ProductId, SeatingMode, TicketType, UserId, Yen,
};
use commerce_fulfillment::payment::{
    PaymentBroker, PaymentProcessor, StubBehavior, StubPaymentProcessor,
};
use commerce_fulfillment::service::{CommerceService, CommerceSettings};
use commerce_fulfillment::store::{CommerceStore, MemoryStore};
use commerce_fulfillment::sync::{ChannelMirror, StatusMirror, StatusPublisher};
use commerce_fulfillment::webhook::{SIGNATURE_HEADER, SignatureVerifier};

pub const JWT_SECRET: &[u8] = b"integration-jwt-secret";
pub const WEBHOOK_SECRET: &[u8] = b"whsec_integration";

pub struct Harness {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub processor: Arc<StubPaymentProcessor>,
    pub jwt: JwtVerifier,
    pub signer: SignatureVerifier,
    pub artist: Actor,
    pub fan: Actor,
    pub admin: Actor,
}

fn actor(role: Role) -> Actor {
    Actor {
        user_id: UserId::new(),
        role,
    }
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let processor = Arc::new(StubPaymentProcessor::new(StubBehavior::Succeed));
    let event_bus = EventBus::new(64);
    let broker = PaymentBroker::new(
        Arc::clone(&processor) as Arc<dyn PaymentProcessor>,
        "jpy",
        Duration::from_secs(2),
    );
    let publisher = StatusPublisher::new(
        vec![Arc::new(ChannelMirror::new(event_bus.clone())) as Arc<dyn StatusMirror>],
        1,
        Duration::from_millis(1),
    );
    let service = Arc::new(CommerceService::new(
        Arc::clone(&store) as Arc<dyn CommerceStore>,
        broker,
        publisher,
        CommerceSettings::default(),
    ));
    let jwt = JwtVerifier::new(JWT_SECRET);
    let signer = SignatureVerifier::new(WEBHOOK_SECRET, 300);
    let state = AppState {
        service,
        identity: Arc::new(jwt.clone()) as Arc<dyn IdentityVerifier>,
        webhook: signer.clone(),
        event_bus,
    };
    Harness {
        app: api::build_app(state.clone(), Duration::from_secs(5)),
        state,
        store,
        processor,
        jwt,
        signer,
        artist: actor(Role::Artist),
        fan: actor(Role::Fan),
        admin: actor(Role::Admin),
    }
}

impl Harness {
    pub fn bearer(&self, actor: Actor) -> String {
        format!("Bearer {}", self.jwt.sign(actor, 600).unwrap())
    }

    pub async fn product(&self, price: i64, stock: u32) -> Product {
        let product = Product {
            id: ProductId::new(),
            seller_id: self.artist.user_id,
            name: "Tour Towel".into(),
            price: Yen::new(price),
            stock,
        };
        self.store.put_product(product.clone()).await.unwrap();
        product
    }

    pub async fn ticket_type(&self, capacity: u32) -> TicketType {
        let tt = TicketType::new(
            EventId::new(),
            self.artist.user_id,
            "S席",
            Yen::new(8_800),
            capacity,
            SeatingMode::Assigned,
        );
        self.store.put_ticket_type(tt.clone()).await.unwrap();
        tt
    }

    pub async fn send(&self, request: Request<Body>) -> (u16, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        read(response).await
    }

    pub async fn post_json(&self, uri: &str, actor: Option<Actor>, body: &Value) -> (u16, Value) {
        let mut builder = Request::post(uri).header("content-type", "application/json");
        if let Some(actor) = actor {
            builder = builder.header("authorization", self.bearer(actor));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, actor: Actor) -> (u16, Value) {
        let request = Request::get(uri)
            .header("authorization", self.bearer(actor))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn webhook(&self, body: &Value, signed: bool) -> u16 {
        let raw = body.to_string();
        let mut builder =
            Request::post("/webhooks/payments").header("content-type", "application/json");
        if signed {
            let signature = self
                .signer
                .sign(raw.as_bytes(), chrono::Utc::now().timestamp())
                .unwrap();
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        self.send(builder.body(Body::from(raw)).unwrap()).await.0
    }
}

async fn read(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
