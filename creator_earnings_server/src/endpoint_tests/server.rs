use creator_earnings_engine::{
    events::EventProducers,
    test_utils::{drop_database, prepare_test_env, random_db_path},
    FraudApi,
    SqliteDatabase,
};
use provider_tools::{MpesaApi, PaystackApi};

use crate::{
    config::ServerConfig,
    server::{create_server_instance, ServerContext},
};

#[actix_web::test]
async fn server_instance_binds_to_the_configured_address() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 2).await.expect("Error creating database");
    let config = ServerConfig { host: "127.0.0.1".into(), port: 0, database_url: url.clone(), ..Default::default() };
    let context = ServerContext {
        db: db.clone(),
        producers: EventProducers::default(),
        fraud_api: FraudApi::new(db.clone(), EventProducers::default()),
        paystack: PaystackApi::new(config.paystack.clone()).expect("paystack client"),
        mpesa: MpesaApi::new(config.mpesa.clone()).expect("mpesa client"),
    };
    let srv = create_server_instance(config, context).expect("server should bind to an ephemeral port");
    srv.handle().stop(false).await;
    db.close().await;
    drop_database(&url).await;
}
