use serde::{Deserialize, Serialize};

use crate::{
    cee_api::risk_rules::DenialReason,
    db_types::{CreatorEarning, FraudFlag, MinorUnits, Payment},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningPostedEvent {
    pub earning: CreatorEarning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningClearedEvent {
    pub earning: CreatorEarning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningRefundedEvent {
    pub earning: CreatorEarning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailedEvent {
    pub payment: Payment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDeniedEvent {
    pub creator_id: String,
    pub amount: MinorUnits,
    pub reason: DenialReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagRaisedEvent {
    pub flag: FraudFlag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorPriceChangedEvent {
    pub creator_id: String,
    pub old_price: Option<MinorUnits>,
    pub new_price: MinorUnits,
}
