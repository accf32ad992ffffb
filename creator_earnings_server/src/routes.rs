//! Request handler definitions
//!
//! Define each route and it handler here. Payment initiation and provider callbacks live in
//! [`crate::provider_routes`].
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Any long, non-cpu-bound operation (I/O, database operations, calls
//! to the payment providers) must be awaited, never blocked on.
//!
//! Every route under `/api` sits behind the JWT middleware. The token subject is the caller's user id, which for
//! creators is also their creator id.
use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use creator_earnings_engine::{
    db_types::{NewPayoutRequest, SubscriptionPlan},
    traits::{CreatorManagement, EarningsLedger, FraudManagement, PayoutManagement, PaymentReconciliation, ReviewQueue},
    CreatorApi,
    FraudApi,
    LedgerApi,
    PayoutApi,
    ReconcilerApi,
    ReviewApi,
};
use log::*;

use crate::{
    auth::{JwtClaims, Role},
    data_objects::{
        ActivateCreatorRequest,
        BalanceResponse,
        CompletePayoutRequest,
        EligibilityQuery,
        EligibilityResponse,
        FlagReviewRequest,
        JsonResponse,
        ManualFlagRequest,
        NewPlanRequest,
        NoteRequest,
        PayoutRequestBody,
        ReasonRequest,
        RefundPaymentRequest,
        UpsertCreatorRequest,
    },
    errors::ServerError,
};

/// Maximum number of earnings cleared by one manually triggered sweep.
const MANUAL_SWEEP_LIMIT: i64 = 1_000;

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:path),+ where requires [$($roles:expr),*]) => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),*]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:path),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------  Creator dashboard  --------------------------------------------------
route!(my_balance => Get "/balance" impl EarningsLedger, ReviewQueue where requires [Role::Creator]);
pub async fn my_balance<B>(claims: JwtClaims, api: web::Data<LedgerApi<B>>) -> Result<HttpResponse, ServerError>
where B: EarningsLedger + ReviewQueue {
    debug!("💻️ GET balance for {}", claims.sub);
    let balance = api.balance(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(balance)))
}

route!(my_earnings => Get "/earnings" impl EarningsLedger, ReviewQueue where requires [Role::Creator]);
pub async fn my_earnings<B>(claims: JwtClaims, api: web::Data<LedgerApi<B>>) -> Result<HttpResponse, ServerError>
where B: EarningsLedger + ReviewQueue {
    debug!("💻️ GET earnings for {}", claims.sub);
    let earnings = api.earnings(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(earnings))
}

route!(my_flags => Get "/flags" impl FraudManagement where requires [Role::Creator]);
pub async fn my_flags<B: FraudManagement>(
    claims: JwtClaims,
    api: web::Data<FraudApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET open flags for {}", claims.sub);
    let flags = api.open_flags(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(flags))
}

route!(my_payouts => Get "/payouts" impl PayoutManagement, ReviewQueue where requires [Role::Creator]);
pub async fn my_payouts<B: PayoutManagement + ReviewQueue>(
    claims: JwtClaims,
    api: web::Data<PayoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET payouts for {}", claims.sub);
    let payouts = api.payouts_for_creator(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(payouts))
}

route!(request_payout => Post "/payouts" impl PayoutManagement, ReviewQueue where requires [Role::Creator]);
/// Runs the risk gate and, if the payout is allowed, reserves the funds and this week's cap. Denials are returned as
/// `422 Unprocessable Entity` with a stable `reason` code.
pub async fn request_payout<B: PayoutManagement + ReviewQueue>(
    claims: JwtClaims,
    body: web::Json<PayoutRequestBody>,
    api: web::Data<PayoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let PayoutRequestBody { amount, destination } = body.into_inner();
    debug!("💻️ POST payout of {amount} for {} to {}", claims.sub, destination.method());
    let payout = api.request_payout(NewPayoutRequest::new(&claims.sub, amount, destination)).await?;
    Ok(HttpResponse::Created().json(payout))
}

route!(payout_eligibility => Get "/payouts/eligibility" impl PayoutManagement, ReviewQueue where requires [Role::Creator]);
pub async fn payout_eligibility<B: PayoutManagement + ReviewQueue>(
    claims: JwtClaims,
    query: web::Query<EligibilityQuery>,
    api: web::Data<PayoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET payout eligibility for {} ({})", claims.sub, query.amount);
    let eligibility = api.evaluate(&claims.sub, query.amount).await?;
    Ok(HttpResponse::Ok().json(EligibilityResponse::from(eligibility)))
}

//----------------------------------------------   Admin: creators  ---------------------------------------------------
route!(upsert_creator => Post "/admin/creators" impl CreatorManagement where requires [Role::Admin]);
pub async fn upsert_creator<B: CreatorManagement>(
    body: web::Json<UpsertCreatorRequest>,
    api: web::Data<CreatorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let UpsertCreatorRequest { creator_id, subscription_price } = body.into_inner();
    debug!("💻️ POST creator {creator_id} at {subscription_price}");
    let creator = api.upsert_creator(&creator_id, subscription_price).await?;
    Ok(HttpResponse::Ok().json(creator))
}

route!(fetch_creator => Get "/admin/creators/{creator_id}" impl CreatorManagement where requires [Role::Admin]);
pub async fn fetch_creator<B: CreatorManagement>(
    path: web::Path<String>,
    api: web::Data<CreatorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let creator = api.fetch_creator(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(creator))
}

route!(activate_creator => Post "/admin/creators/{creator_id}/activate" impl CreatorManagement where requires [Role::Admin]);
pub async fn activate_creator<B: CreatorManagement>(
    path: web::Path<String>,
    body: Option<web::Json<ActivateCreatorRequest>>,
    api: web::Data<CreatorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let creator_id = path.into_inner();
    let at = body.and_then(|b| b.into_inner().activated_at);
    debug!("💻️ POST activate {creator_id}");
    let creator = api.activate_creator(&creator_id, at).await?;
    Ok(HttpResponse::Ok().json(creator))
}

route!(suspend_creator => Post "/admin/creators/{creator_id}/suspend" impl CreatorManagement where requires [Role::Admin]);
pub async fn suspend_creator<B: CreatorManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<ReasonRequest>,
    api: web::Data<CreatorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let creator_id = path.into_inner();
    info!("💻️ {} is suspending {creator_id}. {}", claims.sub, body.reason);
    let creator = api.suspend_creator(&creator_id, &body.reason).await?;
    Ok(HttpResponse::Ok().json(creator))
}

route!(unsuspend_creator => Post "/admin/creators/{creator_id}/unsuspend" impl CreatorManagement where requires [Role::Admin]);
pub async fn unsuspend_creator<B: CreatorManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<CreatorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let creator_id = path.into_inner();
    info!("💻️ {} is lifting the suspension on {creator_id}", claims.sub);
    let creator = api.unsuspend_creator(&creator_id).await?;
    Ok(HttpResponse::Ok().json(creator))
}

route!(register_plan => Post "/admin/plans" impl CreatorManagement where requires [Role::Admin]);
pub async fn register_plan<B: CreatorManagement>(
    body: web::Json<NewPlanRequest>,
    api: web::Data<CreatorApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let NewPlanRequest { plan_id, creator_id, price, currency, platform_fee_bps } = body.into_inner();
    if !(0..=10_000).contains(&platform_fee_bps) {
        return Err(ServerError::InvalidRequestBody(format!(
            "platform_fee_bps must be between 0 and 10000, not {platform_fee_bps}"
        )));
    }
    let plan = SubscriptionPlan { plan_id, creator_id, price, currency, platform_fee_bps };
    let plan = api.register_plan(plan).await?;
    Ok(HttpResponse::Ok().json(plan))
}

//----------------------------------------------   Admin: fraud  -----------------------------------------------------
route!(all_open_flags => Get "/admin/flags" impl FraudManagement where requires [Role::Admin]);
pub async fn all_open_flags<B: FraudManagement>(api: web::Data<FraudApi<B>>) -> Result<HttpResponse, ServerError> {
    let flags = api.all_open_flags().await?;
    Ok(HttpResponse::Ok().json(flags))
}

route!(creator_flags => Get "/admin/creators/{creator_id}/flags" impl FraudManagement where requires [Role::Admin]);
pub async fn creator_flags<B: FraudManagement>(
    path: web::Path<String>,
    api: web::Data<FraudApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let flags = api.open_flags(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(flags))
}

route!(raise_flag => Post "/admin/flags" impl FraudManagement where requires [Role::Admin]);
pub async fn raise_flag<B: FraudManagement>(
    claims: JwtClaims,
    body: web::Json<ManualFlagRequest>,
    api: web::Data<FraudApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let ManualFlagRequest { creator_id, flag_type, reason } = body.into_inner();
    info!("💻️ {} flagged {creator_id} for review ({flag_type}). {reason}", claims.sub);
    let flag = api.flag_for_review(&creator_id, flag_type, &reason).await?;
    Ok(HttpResponse::Created().json(flag))
}

route!(review_flag => Post "/admin/flags/{id}/review" impl FraudManagement where requires [Role::Admin]);
pub async fn review_flag<B: FraudManagement>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<FlagReviewRequest>,
    api: web::Data<FraudApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    let FlagReviewRequest { status, note } = body.into_inner();
    let flag = api.review_flag(id, status, &claims.sub, &note).await?;
    Ok(HttpResponse::Ok().json(flag))
}

//----------------------------------------------   Admin: payouts  ---------------------------------------------------
route!(process_payout => Post "/admin/payouts/{id}/process" impl PayoutManagement, ReviewQueue where requires [Role::Admin]);
pub async fn process_payout<B: PayoutManagement + ReviewQueue>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: Option<web::Json<NoteRequest>>,
    api: web::Data<PayoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let note = body.map(|b| b.into_inner().note).unwrap_or_default();
    let payout = api.begin_processing(path.into_inner(), &claims.sub, &note).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(complete_payout => Post "/admin/payouts/{id}/complete" impl PayoutManagement, ReviewQueue where requires [Role::Admin]);
pub async fn complete_payout<B: PayoutManagement + ReviewQueue>(
    path: web::Path<i64>,
    body: web::Json<CompletePayoutRequest>,
    api: web::Data<PayoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let CompletePayoutRequest { provider_reference, provider_txn_id } = body.into_inner();
    let payout = api.complete_payout(path.into_inner(), &provider_reference, provider_txn_id.as_deref()).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(fail_payout => Post "/admin/payouts/{id}/fail" impl PayoutManagement, ReviewQueue where requires [Role::Admin]);
pub async fn fail_payout<B: PayoutManagement + ReviewQueue>(
    path: web::Path<i64>,
    body: web::Json<ReasonRequest>,
    api: web::Data<PayoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let payout = api.fail_payout(path.into_inner(), &body.reason).await?;
    Ok(HttpResponse::Ok().json(payout))
}

route!(cancel_payout => Post "/admin/payouts/{id}/cancel" impl PayoutManagement, ReviewQueue where requires [Role::Admin]);
pub async fn cancel_payout<B: PayoutManagement + ReviewQueue>(
    path: web::Path<i64>,
    body: web::Json<ReasonRequest>,
    api: web::Data<PayoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let payout = api.cancel_payout(path.into_inner(), &body.reason).await?;
    Ok(HttpResponse::Ok().json(payout))
}

//----------------------------------------------   Admin: ledger  ----------------------------------------------------
route!(refund_earning => Post "/admin/earnings/{id}/refund" impl EarningsLedger, ReviewQueue where requires [Role::Admin]);
pub async fn refund_earning<B>(
    path: web::Path<i64>,
    body: web::Json<ReasonRequest>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: EarningsLedger + ReviewQueue,
{
    let earning = api.refund_earning(path.into_inner(), &body.reason).await?;
    Ok(HttpResponse::Ok().json(earning))
}

route!(clear_earnings => Post "/admin/earnings/clear" impl EarningsLedger, ReviewQueue where requires [Role::Admin]);
/// Runs the clearing sweep now, instead of waiting for the worker.
pub async fn clear_earnings<B>(api: web::Data<LedgerApi<B>>) -> Result<HttpResponse, ServerError>
where B: EarningsLedger + ReviewQueue {
    let result = api.clear_due_earnings(Utc::now(), MANUAL_SWEEP_LIMIT).await?;
    let msg = format!("{} earnings cleared, {} failed", result.cleared.len(), result.failed);
    Ok(HttpResponse::Ok().json(JsonResponse::success(msg)))
}

route!(refund_payment => Post "/admin/payments/refund" impl PaymentReconciliation, ReviewQueue where requires [Role::Admin]);
pub async fn refund_payment<B>(
    body: web::Json<RefundPaymentRequest>,
    api: web::Data<ReconcilerApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentReconciliation + ReviewQueue,
{
    let RefundPaymentRequest { provider, reference, reason } = body.into_inner();
    let (payment, earning) = api.refund_payment(provider, &reference, &reason).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "payment": payment, "earning": earning })))
}

route!(creator_balance => Get "/admin/balances/{creator_id}" impl EarningsLedger, ReviewQueue where requires [Role::Admin]);
pub async fn creator_balance<B>(path: web::Path<String>, api: web::Data<LedgerApi<B>>) -> Result<HttpResponse, ServerError>
where B: EarningsLedger + ReviewQueue {
    let balance = api.balance(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(balance)))
}

route!(verify_balance => Get "/admin/balances/{creator_id}/verify" impl EarningsLedger, ReviewQueue where requires [Role::Admin]);
/// Replays the creator's ledger and compares it with the stored balance. A mismatch is queued for review and
/// reported as a server error.
pub async fn verify_balance<B>(path: web::Path<String>, api: web::Data<LedgerApi<B>>) -> Result<HttpResponse, ServerError>
where B: EarningsLedger + ReviewQueue {
    let balance = api.verify_balance(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse::from(balance)))
}

//----------------------------------------------   Admin: review queue  ----------------------------------------------
route!(review_queue => Get "/admin/review" impl ReviewQueue where requires [Role::Admin]);
pub async fn review_queue<B: ReviewQueue>(api: web::Data<ReviewApi<B>>) -> Result<HttpResponse, ServerError> {
    let items = api.open_items().await?;
    Ok(HttpResponse::Ok().json(items))
}

route!(resolve_review_item => Post "/admin/review/{id}/resolve" impl ReviewQueue where requires [Role::Admin]);
pub async fn resolve_review_item<B: ReviewQueue>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<NoteRequest>,
    api: web::Data<ReviewApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let item = api.resolve(path.into_inner(), &claims.sub, &body.note).await?;
    Ok(HttpResponse::Ok().json(item))
}
