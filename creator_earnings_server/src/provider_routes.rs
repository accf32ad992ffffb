//! Payment initiation and the payment providers' callbacks.
//!
//! Callback responses must be in the 200 range once the body parses, otherwise the providers keep retrying. Anything
//! that goes wrong after that point is logged and left on the review queue for an operator.
use actix_web::{web, HttpResponse};
use creator_earnings_engine::{
    db_types::{NewPayment, Payment, PaymentOutcome, Provider},
    traits::{PaymentReconciliation, ReviewQueue},
    ReconcilerApi,
};
use log::*;
use provider_tools::{helpers::new_paystack_reference, MpesaAck, MpesaApi, MpesaCallback, PaystackApi, PaystackWebhookEvent};
use serde_json::Value;

use crate::{
    auth::{JwtClaims, Role},
    data_objects::{
        JsonResponse,
        PaystackInitializeRequest,
        PaystackInitializeResponse,
        StkPushRequest,
        StkPushResponse,
    },
    errors::ServerError,
    integrations::{
        mpesa::{is_valid_msisdn, outcome_from_callback, outcome_from_query, DEFAULT_TRANSACTION_DESC},
        paystack::{outcome_from_transaction, outcome_from_webhook},
    },
    route,
};

const MPESA_CURRENCY: &str = "KES";

//----------------------------------------------   Payments  ----------------------------------------------------------
route!(my_payments => Get "/payments" impl PaymentReconciliation, ReviewQueue);
pub async fn my_payments<B>(claims: JwtClaims, api: web::Data<ReconcilerApi<B>>) -> Result<HttpResponse, ServerError>
where B: PaymentReconciliation + ReviewQueue {
    debug!("💻️ GET payments for {}", claims.sub);
    let payments = api.payments_for_payer(&claims.sub).await?;
    Ok(HttpResponse::Ok().json(payments))
}

route!(paystack_initialize => Post "/payments/paystack/initialize" impl PaymentReconciliation, ReviewQueue);
/// Records a pending payment and starts a Paystack checkout for it. The reference is generated here, so the payment
/// exists before Paystack can call back about it.
pub async fn paystack_initialize<B>(
    claims: JwtClaims,
    body: web::Json<PaystackInitializeRequest>,
    api: web::Data<ReconcilerApi<B>>,
    paystack: web::Data<PaystackApi>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentReconciliation + ReviewQueue,
{
    if !paystack.is_configured() {
        return Err(ServerError::ProviderNotConfigured("Paystack".into()));
    }
    let req = body.into_inner();
    if !req.amount.is_positive() {
        return Err(ServerError::InvalidRequestBody(format!("{} is not a valid charge", req.amount)));
    }
    let reference = new_paystack_reference();
    let payment = NewPayment::new(&claims.sub, req.amount, &req.currency, Provider::Paystack, &reference);
    let payment = link_payment(payment, req.creator_id.as_deref(), req.plan_id.as_deref());
    let payment = api.initiate_payment(payment).await?;
    let metadata = serde_json::json!({ "payment_id": payment.id, "payer_id": claims.sub, "creator_id": req.creator_id });
    let result = paystack
        .initialize_transaction(&req.email, req.amount, &req.currency, Some(reference.clone()), Some(metadata))
        .await;
    match result {
        Ok(init) => {
            info!("💻️ Paystack checkout {} started for payment #{}", init.reference, payment.id);
            Ok(HttpResponse::Created().json(PaystackInitializeResponse {
                payment_id: payment.id,
                reference: init.reference,
                authorization_url: init.authorization_url,
                access_code: init.access_code,
            }))
        },
        Err(e) if e.is_transient() || matches!(e, provider_tools::ProviderApiError::Unavailable(_)) => {
            // Paystack may or may not have the transaction. The reconciliation worker will find out.
            warn!("💻️ Paystack checkout for payment #{} is in limbo. {e}", payment.id);
            Err(e.into())
        },
        Err(e) => {
            warn!("💻️ Paystack refused checkout for payment #{}. {e}", payment.id);
            let outcome =
                PaymentOutcome::failure(Provider::Paystack, &reference, &format!("Checkout could not be started. {e}"));
            if let Err(le) = api.apply(&outcome).await {
                error!("💻️ Could not mark payment #{} as failed. {le}", payment.id);
            }
            Err(e.into())
        },
    }
}

route!(paystack_verify => Get "/payments/paystack/verify/{reference}" impl PaymentReconciliation, ReviewQueue);
/// Asks Paystack for the transaction's status and applies it. This is what the checkout return page calls.
pub async fn paystack_verify<B>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<ReconcilerApi<B>>,
    paystack: web::Data<PaystackApi>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentReconciliation + ReviewQueue,
{
    let reference = path.into_inner();
    let payment = api.fetch_payment(Provider::Paystack, &reference).await?;
    check_payer(&claims, &payment)?;
    if payment.status.is_terminal() {
        return Ok(HttpResponse::Ok().json(payment));
    }
    let tx = paystack.verify_transaction(&reference).await?;
    let change = api.apply(&outcome_from_transaction(&tx)).await?;
    Ok(HttpResponse::Ok().json(change.payment))
}

route!(mpesa_stk_push => Post "/payments/mpesa/stkpush" impl PaymentReconciliation, ReviewQueue);
/// Sends the STK prompt to the customer's phone and records the pending payment under Daraja's checkout request id.
pub async fn mpesa_stk_push<B>(
    claims: JwtClaims,
    body: web::Json<StkPushRequest>,
    api: web::Data<ReconcilerApi<B>>,
    mpesa: web::Data<MpesaApi>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentReconciliation + ReviewQueue,
{
    if !mpesa.is_configured() {
        return Err(ServerError::ProviderNotConfigured("M-Pesa".into()));
    }
    let req = body.into_inner();
    if !is_valid_msisdn(&req.phone_number) {
        return Err(ServerError::InvalidRequestBody(format!(
            "{} is not a valid M-Pesa number (254XXXXXXXXX)",
            req.phone_number
        )));
    }
    if !req.amount.is_positive() {
        return Err(ServerError::InvalidRequestBody(format!("{} is not a valid charge", req.amount)));
    }
    req.amount.to_major().map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let description = req.description.as_deref().unwrap_or(DEFAULT_TRANSACTION_DESC);
    let push = mpesa.stk_push(&req.phone_number, req.amount, description).await?;
    let reference = push.checkout_request_id.clone();
    let payment = NewPayment::new(&claims.sub, req.amount, MPESA_CURRENCY, Provider::Mpesa, &reference);
    let payment = link_payment(payment, req.creator_id.as_deref(), req.plan_id.as_deref());
    let payment = api.initiate_payment(payment).await.map_err(|e| {
        error!("💻️ STK push {reference} was sent but the payment could not be recorded. {e}");
        e
    })?;
    Ok(HttpResponse::Created().json(StkPushResponse {
        payment_id: payment.id,
        checkout_request_id: push.checkout_request_id,
        customer_message: push.customer_message,
    }))
}

route!(mpesa_status => Get "/payments/mpesa/status/{checkout_request_id}" impl PaymentReconciliation, ReviewQueue);
pub async fn mpesa_status<B>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<ReconcilerApi<B>>,
    mpesa: web::Data<MpesaApi>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentReconciliation + ReviewQueue,
{
    let reference = path.into_inner();
    let payment = api.fetch_payment(Provider::Mpesa, &reference).await?;
    check_payer(&claims, &payment)?;
    if payment.status.is_terminal() {
        return Ok(HttpResponse::Ok().json(payment));
    }
    let response = mpesa.query_stk_status(&reference).await?;
    let change = api.apply(&outcome_from_query(&reference, &response)).await?;
    Ok(HttpResponse::Ok().json(change.payment))
}

fn link_payment(mut payment: NewPayment, creator_id: Option<&str>, plan_id: Option<&str>) -> NewPayment {
    if let Some(creator_id) = creator_id {
        payment = payment.with_creator(creator_id);
    }
    if let Some(plan_id) = plan_id {
        payment = payment.with_plan(plan_id);
    }
    payment
}

/// Other people's payments are reported as missing, unless the caller is an admin.
fn check_payer(claims: &JwtClaims, payment: &Payment) -> Result<(), ServerError> {
    if payment.payer_id == claims.sub || claims.has_role(Role::Admin) {
        Ok(())
    } else {
        debug!("💻️ {} asked about payment #{}, which belongs to someone else", claims.sub, payment.id);
        Err(ServerError::NoRecordFound(format!("Payment {}", payment.provider_reference)))
    }
}

//----------------------------------------------   Callbacks  ---------------------------------------------------------
route!(paystack_callback => Post "" impl PaymentReconciliation, ReviewQueue);
/// Paystack webhook. The signature has already been checked by the HMAC middleware.
pub async fn paystack_callback<B>(
    body: web::Json<PaystackWebhookEvent>,
    api: web::Data<ReconcilerApi<B>>,
) -> HttpResponse
where
    B: PaymentReconciliation + ReviewQueue,
{
    let event = body.into_inner();
    trace!("💻️ Received Paystack {} event", event.event);
    let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
    match outcome_from_webhook(&event) {
        Ok(Some(outcome)) => apply_callback_outcome(&api, &outcome, payload).await,
        Ok(None) => {},
        Err(e) => {
            let reference = event.data["reference"].as_str().unwrap_or("unknown");
            warn!("💻️ Could not read the transaction in Paystack {} event. {e}", event.event);
            record_failure(&api, reference, &format!("Malformed {} event. {e}", event.event), payload).await;
        },
    }
    HttpResponse::Ok().json(JsonResponse::success("Event received"))
}

route!(mpesa_callback => Post "" impl PaymentReconciliation, ReviewQueue);
/// Daraja STK push callback. The IP whitelist, if any, has already been applied.
pub async fn mpesa_callback<B>(body: web::Json<MpesaCallback>, api: web::Data<ReconcilerApi<B>>) -> HttpResponse
where B: PaymentReconciliation + ReviewQueue {
    let callback = body.into_inner();
    let stk = &callback.body.stk_callback;
    trace!("💻️ Received M-Pesa callback for {} ({})", stk.checkout_request_id, stk.result_code);
    let outcome = outcome_from_callback(stk);
    let payload = serde_json::to_value(&callback).unwrap_or(Value::Null);
    apply_callback_outcome(&api, &outcome, payload).await;
    HttpResponse::Ok().json(MpesaAck::accepted())
}

async fn apply_callback_outcome<B>(api: &ReconcilerApi<B>, outcome: &PaymentOutcome, payload: Value)
where B: PaymentReconciliation + ReviewQueue {
    match api.apply(outcome).await {
        Ok(change) if change.changed => {
            info!("💻️ {} payment {} is now {}", outcome.provider, outcome.reference, change.payment.status)
        },
        Ok(change) => {
            debug!("💻️ Duplicate callback for {} payment {} ({})", outcome.provider, outcome.reference, change.payment.status)
        },
        // Already on the review queue
        Err(e) if e.needs_operator() => warn!("💻️ Callback for {} needs an operator. {e}", outcome.reference),
        Err(e) => {
            warn!("💻️ Could not apply callback for {} payment {}. {e}", outcome.provider, outcome.reference);
            record_failure(api, &outcome.reference, &e.to_string(), payload).await;
        },
    }
}

async fn record_failure<B>(api: &ReconcilerApi<B>, reference: &str, reason: &str, payload: Value)
where B: PaymentReconciliation + ReviewQueue {
    if let Err(e) = api.record_callback_failure(reference, reason, payload).await {
        error!("💻️ Could not queue the failed callback for {reference} for review. {e}");
    }
}
