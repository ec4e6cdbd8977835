use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use dxid_config::DxidConfig;
use dxid_core::{Address, ChainView, SignedTransaction, ValidationContext, REF_HEAD_CHAIN_TIP};
use dxid_crypto::address_from_string;
use dxid_storage::{BlockStore, PgChainView, PgStore, StateStore};
use serde::Serialize;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{info, warn};

pub mod proto {
    tonic::include_proto!("dxid");
}

/// Knobs the RPC surface hands `ValidationContext` for every submitted
/// transaction; mirrors `dxid_config::ValidationConfig`.
#[derive(Clone, Copy)]
pub struct ValidationOpts {
    pub enforce_unspent: bool,
    pub allow_short_long_matching: bool,
}

#[derive(Clone)]
pub struct RpcState {
    pub store: Arc<PgStore>,
    pub chain_view: Arc<PgChainView>,
    pub validation: ValidationOpts,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    height: u64,
    peers: usize,
}

pub async fn start_servers(cfg: &DxidConfig, store: Arc<PgStore>, chain_view: Arc<PgChainView>) -> Result<()> {
    let state = RpcState {
        store,
        chain_view,
        validation: ValidationOpts {
            enforce_unspent: cfg.validation.enforce_unspent,
            allow_short_long_matching: cfg.validation.allow_short_long_matching,
        },
    };
    let rest_addr: SocketAddr = cfg.api.rest_addr.parse()?;
    let grpc_addr: SocketAddr = cfg.api.grpc_addr.parse()?;
    let rest_handle = tokio::spawn(run_rest(rest_addr, state.clone()));
    let grpc_handle = tokio::spawn(run_grpc(grpc_addr, state));
    rest_handle.await??;
    grpc_handle.await??;
    Ok(())
}

async fn run_rest(addr: SocketAddr, state: RpcState) -> Result<()> {
    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/blocks/:height", get(get_block))
        .route("/balance/:address", get(balance))
        .route("/transactions", post(submit_transaction))
        .with_state(state);
    info!("REST listening on {addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn status(State(state): State<RpcState>) -> Json<StatusResponse> {
    let height = state
        .chain_view
        .head_block_num()
        .unwrap_or_else(|e| {
            warn!("head_block_num failed: {e}");
            0
        });
    Json(StatusResponse {
        height: height as u64,
        peers: 0,
    })
}

async fn get_block(
    State(state): State<RpcState>,
    Path(height): Path<u64>,
) -> Result<Json<serde_json::Value>, Status> {
    let block = state
        .store
        .get_block_by_height(height as i64)
        .await
        .map_err(|_| Status::internal("db error"))?;
    Ok(Json(serde_json::json!({ "block": block })))
}

async fn balance(
    State(state): State<RpcState>,
    Path(addr): Path<String>,
) -> Result<Json<serde_json::Value>, Status> {
    let address = address_from_string(&addr).map_err(|_| Status::invalid_argument("bad address"))?;
    let balance = state
        .store
        .get_balance(&address)
        .await
        .map_err(|_| Status::internal("db error"))?;
    Ok(Json(serde_json::json!({ "balance": balance })))
}

/// Runs a submitted transaction through `ValidationContext` against this
/// node's chain view; does not itself write anything (acceptance into a
/// block/mempool is mempool/consensus machinery outside this core).
fn validate_submission(state: &RpcState, trx: SignedTransaction) -> anyhow::Result<u128> {
    let mut ctx = ValidationContext::new(
        trx,
        state.chain_view.as_ref(),
        state.validation.enforce_unspent,
        REF_HEAD_CHAIN_TIP,
    )?;
    ctx.set_allow_short_long_matching(state.validation.allow_short_long_matching);
    ctx.validate()?;
    Ok(ctx.total_cdd())
}

async fn submit_transaction(
    State(state): State<RpcState>,
    Json(trx): Json<SignedTransaction>,
) -> Json<serde_json::Value> {
    match validate_submission(&state, trx) {
        // total_cdd is u128; encode it as a string since JSON numbers
        // don't hold more than 64 bits of integer precision losslessly.
        Ok(total_cdd) => {
            Json(serde_json::json!({ "accepted": true, "total_cdd": total_cdd.to_string() }))
        }
        Err(e) => Json(serde_json::json!({ "accepted": false, "error": e.to_string() })),
    }
}

#[derive(Clone)]
pub struct GrpcService {
    state: RpcState,
}

#[tonic::async_trait]
impl proto::dxid_server::Dxid for GrpcService {
    async fn get_status(
        &self,
        _request: Request<proto::StatusRequest>,
    ) -> Result<Response<proto::StatusResponse>, Status> {
        let height = self
            .state
            .chain_view
            .head_block_num()
            .map_err(|_| Status::internal("chain view error"))?;
        let reply = proto::StatusResponse {
            height: height as u64,
            peers: 0,
            version: "0.1.0".into(),
        };
        Ok(Response::new(reply))
    }

    async fn get_block(
        &self,
        request: Request<proto::BlockRequest>,
    ) -> Result<Response<proto::BlockResponse>, Status> {
        let height = request.into_inner().height;
        let block = self
            .state
            .store
            .get_block_by_height(height as i64)
            .await
            .map_err(|_| Status::internal("db error"))?;
        let json = serde_json::to_string(&block).unwrap_or_default();
        Ok(Response::new(proto::BlockResponse { block_json: json }))
    }

    async fn get_balance(
        &self,
        request: Request<proto::BalanceRequest>,
    ) -> Result<Response<proto::BalanceResponse>, Status> {
        let addr = request.into_inner().address;
        let address = address_from_string(&addr).map_err(|_| Status::invalid_argument("bad address"))?;
        let balance = self
            .state
            .store
            .get_balance(&address)
            .await
            .map_err(|_| Status::internal("db error"))?;
        Ok(Response::new(proto::BalanceResponse { balance }))
    }

    async fn submit_transaction(
        &self,
        request: Request<proto::SubmitTransactionRequest>,
    ) -> Result<Response<proto::SubmitTransactionResponse>, Status> {
        let transaction_json = request.into_inner().transaction_json;
        let trx: SignedTransaction = serde_json::from_str(&transaction_json)
            .map_err(|e| Status::invalid_argument(format!("bad transaction json: {e}")))?;
        let reply = match validate_submission(&self.state, trx) {
            // The wire response carries total_cdd as a fixed uint64; a
            // transaction validating to a stake-window CDD total wider than
            // that is not a case the current network parameters produce,
            // so the value is saturated rather than wrapped at the boundary.
            Ok(total_cdd) => proto::SubmitTransactionResponse {
                accepted: true,
                error: String::new(),
                total_cdd: total_cdd.min(u64::MAX as u128) as u64,
            },
            Err(e) => proto::SubmitTransactionResponse {
                accepted: false,
                error: e.to_string(),
                total_cdd: 0,
            },
        };
        Ok(Response::new(reply))
    }
}

async fn run_grpc(addr: SocketAddr, state: RpcState) -> Result<()> {
    info!("gRPC listening on {addr}");
    let svc = GrpcService { state };
    Server::builder()
        .add_service(proto::dxid_server::DxidServer::new(svc))
        .serve(addr)
        .await?;
    Ok(())
}
