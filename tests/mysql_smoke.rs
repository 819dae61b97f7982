use query_executor::{config::Config, db::MySqlDriver, params, QueryExecutor, Value};

fn executor_from_env() -> QueryExecutor {
    let config = Config::from_env().expect("DB_* variables must be set for MySQL tests");
    QueryExecutor::new(MySqlDriver::from_config(&config), config.pool_config())
}

#[tokio::test]
#[ignore = "requires a live MySQL server (DB_HOST, DB_USER, DB_PWD, DB_NAME)"]
async fn test_select_now_against_mysql() {
    let executor = executor_from_env();

    let result = executor.ping().await.unwrap();

    assert_eq!(result.len(), 1);
    assert!(matches!(
        result.first().and_then(|row| row.get_index(0)),
        Some(Value::DateTime(_))
    ));

    executor.close().await;
}

#[tokio::test]
#[ignore = "requires a live MySQL server (DB_HOST, DB_USER, DB_PWD, DB_NAME)"]
async fn test_bound_params_against_mysql() {
    let executor = executor_from_env();

    let result = executor
        .execute("select ? + 1 as answer, ? as greeting", &params![41, "hi"])
        .await
        .unwrap();

    let row = result.first().unwrap();
    assert_eq!(row.get("answer").and_then(Value::as_i64), Some(42));
    assert_eq!(row.get("greeting").and_then(Value::as_str), Some("hi"));

    executor.close().await;
}

#[tokio::test]
#[ignore = "requires a live MySQL server (DB_HOST, DB_USER, DB_PWD, DB_NAME)"]
async fn test_syntax_error_against_mysql() {
    let executor = executor_from_env();

    let err = executor.execute("selec 1", &[]).await.unwrap_err();
    assert_eq!(
        err.driver_error().map(|e| e.kind),
        Some(query_executor::DriverErrorKind::Syntax)
    );

    // The connection survives a syntax error
    assert!(executor.ping().await.is_ok());
    assert_eq!(executor.status().await.connections_created, 1);

    executor.close().await;
}
