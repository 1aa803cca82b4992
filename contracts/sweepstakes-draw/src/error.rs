use cosmwasm_std::StdError;
use sweepstakes_draw_engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContractError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("invalid hex input: {field}")]
    InvalidHex { field: String },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("invalid msisdn: {msisdn}")]
    InvalidMsisdn { msisdn: String },

    #[error("a forfeit reason is required")]
    EmptyReason,
}
