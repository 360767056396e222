use crate::peer::HttpPeerClient;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::consensus::{ChainResponse, ConsensusResolver, Resolution};
use ledger_core::mine::Miner;
use ledger_core::pow::Abort;
use ledger_core::{registry, rewards, Block, Ledger, LedgerError, Transaction};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub resolver: Arc<ConsensusResolver<HttpPeerClient>>,
    pub miner: Miner,
    pub mine_timeout: Option<Duration>,
}

/// Error body `{"error": ...}` with a status derived from the ledger error.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::InvalidAddress(_) | LedgerError::InsufficientFunds { .. } => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::StaleTip { .. } | LedgerError::InvalidProof { .. } => StatusCode::CONFLICT,
            LedgerError::MiningAbandoned => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::EmptyChain
            | LedgerError::IndexExhausted { .. }
            | LedgerError::InvalidChain(_)
            | LedgerError::Persistence(_) => {
                error!(error = %err, "ledger failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &err {
            LedgerError::InsufficientFunds { .. } => "Insufficient balance".to_owned(),
            _ => err.to_string(),
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/mine", get(mine))
        .route("/transactions/new", post(new_transaction))
        .route("/transactions/pending", get(pending_transactions))
        .route("/chain", get(full_chain))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(consensus))
        .route("/user/new", get(new_user))
        .route("/rewards/earn", post(earn_rewards))
        .route("/rewards/spend", post(spend_rewards))
        .route("/rewards/balance", get(get_balance))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs a mining-bound ledger operation on the blocking pool under the
/// node's mining deadline.
async fn blocking<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Ledger, &Miner, &Abort) -> ledger_core::error::Result<T> + Send + 'static,
{
    let ledger = Arc::clone(&state.ledger);
    let miner = state.miner.clone();
    let abort = Abort::with_optional_timeout(state.mine_timeout);
    tokio::task::spawn_blocking(move || op(&ledger, &miner, &abort))
        .await
        .map_err(|err| ApiError::internal(format!("mining task failed: {err}")))?
        .map_err(ApiError::from)
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the ledger node",
        "endpoints": [
            "/mine",
            "/transactions/new",
            "/transactions/pending",
            "/chain",
            "/nodes/register",
            "/nodes/resolve",
            "/user/new",
            "/rewards/earn",
            "/rewards/spend",
            "/rewards/balance",
        ],
    }))
}

async fn mine(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let block: Block = blocking(&state, |ledger, miner, abort| {
        miner.mine_rewarded(ledger, abort)
    })
    .await?;
    Ok(Json(json!({
        "message": "New Block Forged",
        "index": block.index,
        "transactions": block.transactions,
        "proof": block.proof,
        "previous_hash": block.previous_hash,
    })))
}

#[derive(Deserialize)]
struct TxIn {
    sender: Option<String>,
    recipient: Option<String>,
    amount: Option<u64>,
}

async fn new_transaction(
    State(state): State<AppState>,
    Json(body): Json<TxIn>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (Some(sender), Some(recipient)) = (body.sender, body.recipient) else {
        return Err(ApiError::bad_request("Missing values"));
    };
    let index = state.ledger.add_transaction(Transaction {
        sender,
        recipient,
        amount: body.amount,
    })?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": format!("Transaction will be added to Block {index}") })),
    ))
}

async fn pending_transactions(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "transactions": state.ledger.pending() }))
}

async fn full_chain(State(state): State<AppState>) -> Json<ChainResponse> {
    Json(ChainResponse::new(state.ledger.chain().to_vec()))
}

#[derive(Deserialize)]
struct NodesIn {
    nodes: Option<Vec<String>>,
}

async fn register_nodes(
    State(state): State<AppState>,
    Json(body): Json<NodesIn>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Some(nodes) = body.nodes else {
        return Err(ApiError::bad_request(
            "Error: Please supply a valid list of nodes",
        ));
    };
    // Reject the whole request before touching the registry.
    for node in &nodes {
        registry::parse_address(node)?;
    }
    for node in &nodes {
        state.ledger.register_node(node)?;
    }
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "New nodes have been added",
            "total_nodes": state.ledger.nodes(),
        })),
    ))
}

async fn consensus(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let resolution = state.resolver.resolve(state.ledger.as_ref()).await?;
    let chain = state.ledger.chain();
    let body = match resolution {
        Resolution::Replaced { .. } => json!({
            "message": "Our chain was replaced",
            "new_chain": chain.as_slice(),
        }),
        Resolution::Authoritative { .. } => json!({
            "message": "Our chain is authoritative",
            "chain": chain.as_slice(),
        }),
    };
    Ok(Json(body))
}

async fn new_user() -> Json<Value> {
    Json(json!({ "user_id": rewards::new_user_id(), "balance": 0 }))
}

#[derive(Deserialize)]
struct EarnIn {
    user_id: Option<String>,
    amount: Option<u64>,
}

async fn earn_rewards(
    State(state): State<AppState>,
    Json(body): Json<EarnIn>,
) -> ApiResult<Json<Value>> {
    let Some(user_id) = body.user_id.filter(|u| !u.is_empty()) else {
        return Err(ApiError::bad_request("Missing user_id"));
    };
    let amount = body.amount.unwrap_or(1);
    let user = user_id.clone();
    let balance = blocking(&state, move |ledger, miner, abort| {
        rewards::earn(ledger, miner, &user, amount, abort)
    })
    .await?;
    Ok(Json(json!({
        "message": format!("{amount} token(s) added to user {user_id}"),
        "balance": balance,
    })))
}

#[derive(Deserialize)]
struct SpendIn {
    user_id: Option<String>,
    item: Option<String>,
    cost: Option<u64>,
}

async fn spend_rewards(
    State(state): State<AppState>,
    Json(body): Json<SpendIn>,
) -> ApiResult<Json<Value>> {
    let (Some(user_id), Some(item)) = (
        body.user_id.filter(|u| !u.is_empty()),
        body.item.filter(|i| !i.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Missing user_id or item"));
    };
    let cost = body.cost.unwrap_or(1);
    let (user, what) = (user_id.clone(), item.clone());
    let balance = blocking(&state, move |ledger, miner, abort| {
        rewards::spend(ledger, miner, &user, &what, cost, abort)
    })
    .await?;
    Ok(Json(json!({
        "message": format!("User {user_id} bought {item} for {cost} token(s)"),
        "balance": balance,
    })))
}

#[derive(Deserialize)]
struct BalanceQuery {
    user_id: Option<String>,
}

async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<Json<Value>> {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return Err(ApiError::bad_request("Missing user_id"));
    };
    let balance = rewards::balance(state.ledger.as_ref(), &user_id);
    Ok(Json(json!({ "user_id": user_id, "balance": balance })))
}
