use std::time::Duration;

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    Error,
    HttpServer,
};
use creator_earnings_engine::{
    events::{EventHandlers, EventProducers},
    fraud_event_hooks,
    CreatorApi,
    FraudApi,
    LedgerApi,
    PayoutApi,
    ReconcilerApi,
    ReviewApi,
    SqliteDatabase,
};
use futures::{future::ok, FutureExt};
use log::*;
use provider_tools::{MpesaApi, PaystackApi};

use crate::{
    auth::TokenValidator,
    config::{ServerConfig, ServerOptions},
    errors::{AuthError, ServerError},
    helpers::is_whitelisted_mpesa_peer,
    integrations::alerts::{alert_hooks, AlertNotifier},
    middleware::{HmacMiddlewareFactory, JwtMiddlewareFactory},
    provider_routes::{
        MpesaCallbackRoute,
        MpesaStatusRoute,
        MpesaStkPushRoute,
        MyPaymentsRoute,
        PaystackCallbackRoute,
        PaystackInitializeRoute,
        PaystackVerifyRoute,
    },
    routes::{
        health,
        ActivateCreatorRoute,
        AllOpenFlagsRoute,
        CancelPayoutRoute,
        ClearEarningsRoute,
        CompletePayoutRoute,
        CreatorBalanceRoute,
        CreatorFlagsRoute,
        FailPayoutRoute,
        FetchCreatorRoute,
        MyBalanceRoute,
        MyEarningsRoute,
        MyFlagsRoute,
        MyPayoutsRoute,
        PayoutEligibilityRoute,
        ProcessPayoutRoute,
        RaiseFlagRoute,
        RefundEarningRoute,
        RefundPaymentRoute,
        RegisterPlanRoute,
        RequestPayoutRoute,
        ResolveReviewItemRoute,
        ReviewFlagRoute,
        ReviewQueueRoute,
        SuspendCreatorRoute,
        UnsuspendCreatorRoute,
        UpsertCreatorRoute,
        VerifyBalanceRoute,
    },
    workers::{start_clearing_worker, start_reconciliation_worker, ReconciliationPoller},
};

const EVENT_BUFFER_SIZE: usize = 100;
const MAX_DB_CONNECTIONS: u32 = 25;

/// Everything the HTTP workers share.
#[derive(Clone)]
pub struct ServerContext {
    pub db: SqliteDatabase,
    pub producers: EventProducers,
    pub fraud_api: FraudApi<SqliteDatabase>,
    pub paystack: PaystackApi,
    pub mpesa: MpesaApi,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not run migrations. {e}")))?;
    info!("🚀️ Database ready at {}", db.url());
    let paystack = PaystackApi::new(config.paystack.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let mpesa = MpesaApi::new(config.mpesa.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let notifier = config
        .alert_webhook_url
        .as_deref()
        .map(AlertNotifier::new)
        .transpose()
        .map_err(|e| ServerError::InitializeError(format!("Could not create the alert client. {e}")))?;
    // Flags raised by the fraud checks go to the alert hooks; ledger events go to the fraud checks
    let alert_handlers = EventHandlers::new(EVENT_BUFFER_SIZE, alert_hooks(notifier));
    let fraud_api = FraudApi::new(db.clone(), alert_handlers.producers());
    let fraud_handlers = EventHandlers::new(EVENT_BUFFER_SIZE, fraud_event_hooks(fraud_api.clone()));
    let producers = fraud_handlers.producers();
    alert_handlers.start_handlers().await;
    fraud_handlers.start_handlers().await;

    start_clearing_worker(db.clone(), producers.clone(), config.ledger_policy, config.clearing_interval);
    let reconciler = ReconcilerApi::new(db.clone(), producers.clone()).with_policy(config.ledger_policy);
    let poller =
        ReconciliationPoller::new(reconciler, ReviewApi::new(db.clone()), paystack.clone(), mpesa.clone(), config.stale_payment_age);
    start_reconciliation_worker(poller, config.reconciliation_interval);

    let context = ServerContext { db, producers, fraud_api, paystack, mpesa };
    let srv = create_server_instance(config, context)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, context: ServerContext) -> Result<Server, ServerError> {
    let (host, port) = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let ServerContext { db, producers, fraud_api, paystack, mpesa } = context.clone();
        let reconciler_api = ReconcilerApi::new(db.clone(), producers.clone()).with_policy(config.ledger_policy);
        let ledger_api = LedgerApi::new(db.clone(), producers.clone()).with_policy(config.ledger_policy);
        let payout_api = PayoutApi::new(db.clone(), producers.clone())
            .with_policy(config.risk_policy)
            .with_payout_fee(config.payout_fee);
        let creator_api = CreatorApi::new(db.clone(), producers);
        let review_api = ReviewApi::new(db);
        let options = ServerOptions::from_config(&config);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ceg::access_log"))
            .app_data(web::Data::new(reconciler_api))
            .app_data(web::Data::new(ledger_api))
            .app_data(web::Data::new(payout_api))
            .app_data(web::Data::new(creator_api))
            .app_data(web::Data::new(fraud_api))
            .app_data(web::Data::new(review_api))
            .app_data(web::Data::new(paystack))
            .app_data(web::Data::new(mpesa))
            .app_data(web::Data::new(options.clone()));
        // Routes that require authentication
        let api_scope = web::scope("/api")
            .wrap(JwtMiddlewareFactory::new(TokenValidator::new(&config.auth)))
            .service(MyPaymentsRoute::<SqliteDatabase>::new())
            .service(PaystackInitializeRoute::<SqliteDatabase>::new())
            .service(PaystackVerifyRoute::<SqliteDatabase>::new())
            .service(MpesaStkPushRoute::<SqliteDatabase>::new())
            .service(MpesaStatusRoute::<SqliteDatabase>::new())
            .service(MyBalanceRoute::<SqliteDatabase>::new())
            .service(MyEarningsRoute::<SqliteDatabase>::new())
            .service(MyFlagsRoute::<SqliteDatabase>::new())
            .service(MyPayoutsRoute::<SqliteDatabase>::new())
            .service(RequestPayoutRoute::<SqliteDatabase>::new())
            .service(PayoutEligibilityRoute::<SqliteDatabase>::new())
            .service(UpsertCreatorRoute::<SqliteDatabase>::new())
            .service(FetchCreatorRoute::<SqliteDatabase>::new())
            .service(ActivateCreatorRoute::<SqliteDatabase>::new())
            .service(SuspendCreatorRoute::<SqliteDatabase>::new())
            .service(UnsuspendCreatorRoute::<SqliteDatabase>::new())
            .service(CreatorFlagsRoute::<SqliteDatabase>::new())
            .service(RegisterPlanRoute::<SqliteDatabase>::new())
            .service(AllOpenFlagsRoute::<SqliteDatabase>::new())
            .service(RaiseFlagRoute::<SqliteDatabase>::new())
            .service(ReviewFlagRoute::<SqliteDatabase>::new())
            .service(ProcessPayoutRoute::<SqliteDatabase>::new())
            .service(CompletePayoutRoute::<SqliteDatabase>::new())
            .service(FailPayoutRoute::<SqliteDatabase>::new())
            .service(CancelPayoutRoute::<SqliteDatabase>::new())
            .service(ClearEarningsRoute::<SqliteDatabase>::new())
            .service(RefundEarningRoute::<SqliteDatabase>::new())
            .service(RefundPaymentRoute::<SqliteDatabase>::new())
            .service(CreatorBalanceRoute::<SqliteDatabase>::new())
            .service(VerifyBalanceRoute::<SqliteDatabase>::new())
            .service(ReviewQueueRoute::<SqliteDatabase>::new())
            .service(ResolveReviewItemRoute::<SqliteDatabase>::new());
        let paystack_scope = web::scope("/paystack")
            .wrap(HmacMiddlewareFactory::paystack(config.paystack.secret_key.clone(), config.paystack_signature_checks))
            .service(PaystackCallbackRoute::<SqliteDatabase>::new());
        let mpesa_scope = web::scope("/mpesa")
            .wrap_fn(move |req, srv| {
                if is_whitelisted_mpesa_peer(req.request(), &options) {
                    srv.call(req).boxed_local()
                } else {
                    let res = req.error_response(ServerError::AuthenticationError(AuthError::ForbiddenPeer));
                    ok::<_, Error>(res).boxed_local()
                }
            })
            .service(MpesaCallbackRoute::<SqliteDatabase>::new());
        let callback_scope = web::scope("/callbacks").service(paystack_scope).service(mpesa_scope);
        app.service(health).service(callback_scope).service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
