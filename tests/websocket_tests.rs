//! WebSocket integration tests

use actionlog::models::{
    ActionLogStatus, CreateActionLogRequest, Department, Priority, Role, User,
};
use actionlog::store::MIGRATOR;
use actionlog::workflow::Authority;
use actionlog::AppState;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn setup_server() -> (SocketAddr, Arc<AppState>, Department) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    MIGRATOR.run(&pool).await.expect("Failed to run migrations");

    let state = AppState::new(pool);
    let now = Utc::now();
    let department = Department {
        id: Uuid::new_v4(),
        name: "Economic Planning".to_string(),
        code: "EP".to_string(),
        description: String::new(),
        created_at: now,
        updated_at: now,
    };
    state.store().create_department(&department).await.unwrap();

    let app = actionlog::router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, state, department)
}

async fn create_user(state: &AppState, department: &Department, name: &str, role: Role) -> User {
    let now = Utc::now();
    let authorities = match role {
        Role::Commissioner => vec![Authority::Commissioner],
        Role::AssistantCommissioner => vec![Authority::AssistantCommissioner],
        _ => vec![],
    };
    let user = User {
        id: Uuid::new_v4(),
        username: name.to_string(),
        email: format!("{}@example.org", name),
        first_name: name.to_string(),
        last_name: String::new(),
        role,
        designation: None,
        authorities: authorities.into(),
        department_id: Some(department.id),
        unit_id: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.store().create_user(&user).await.unwrap();
    user
}

async fn connect(addr: SocketAddr, user: &User) -> WsStream {
    let url = format!("ws://{}/ws?user_id={}", addr, user.id);
    let (mut ws_stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let connected = next_json(&mut ws_stream).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["user_id"], user.id.to_string());
    ws_stream
}

async fn next_json(ws_stream: &mut WsStream) -> serde_json::Value {
    let msg = timeout(Duration::from_secs(2), ws_stream.next())
        .await
        .expect("Timed out waiting for message");
    match msg {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected text message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_websocket_rejects_unknown_user() {
    let (addr, _state, _department) = setup_server().await;

    let url = format!("ws://{}/ws?user_id={}", addr, Uuid::new_v4());
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());
}

#[tokio::test]
async fn test_websocket_ping() {
    let (addr, state, department) = setup_server().await;
    let user = create_user(&state, &department, "alice", Role::Economist).await;
    let mut ws_stream = connect(addr, &user).await;

    ws_stream
        .send(Message::Text(serde_json::json!({"type": "ping"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws_stream).await["type"], "pong");

    ws_stream
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    let error = next_json(&mut ws_stream).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"]
        .as_str()
        .unwrap()
        .contains("Invalid message"));
}

#[tokio::test]
async fn test_websocket_receives_assignment_and_approval_events() {
    let (addr, state, department) = setup_server().await;
    let commissioner = create_user(&state, &department, "comm", Role::Commissioner).await;
    let ac = create_user(&state, &department, "ac", Role::AssistantCommissioner).await;
    let a = create_user(&state, &department, "alice", Role::Economist).await;
    let bystander = create_user(&state, &department, "bob", Role::Economist).await;

    let mut a_stream = connect(addr, &a).await;
    let mut bystander_stream = connect(addr, &bystander).await;

    let log = state
        .workflow
        .create_log(
            commissioner.clone(),
            CreateActionLogRequest {
                title: "Medium-term debt strategy".to_string(),
                description: None,
                due_date: None,
                priority: Priority::Medium,
                department_id: department.id,
                unit_id: None,
                assigned_to: vec![a.id],
                team_leader: None,
            },
        )
        .await
        .unwrap();

    let assigned = next_json(&mut a_stream).await;
    assert_eq!(assigned["type"], "event");
    assert_eq!(assigned["event"]["type"], "log_assigned");
    assert_eq!(assigned["event"]["log_id"], log.id.to_string());

    state
        .workflow
        .update_status(a.clone(), log.id, ActionLogStatus::InProgress, None)
        .await
        .unwrap();
    let log = state
        .workflow
        .update_status(a.clone(), log.id, ActionLogStatus::Closed, None)
        .await
        .unwrap();
    // no unit and no authority among the assignees
    assert_eq!(log.status, ActionLogStatus::PendingApproval);

    state.workflow.approve(ac, log.id, None).await.unwrap();
    let approved = next_json(&mut a_stream).await;
    assert_eq!(approved["event"]["type"], "log_approved");
    assert_eq!(approved["event"]["stage"], "commissioner");
    assert_eq!(approved["event"]["closed"], false);

    state
        .workflow
        .approve(commissioner, log.id, None)
        .await
        .unwrap();
    let closed = next_json(&mut a_stream).await;
    assert_eq!(closed["event"]["type"], "log_approved");
    assert_eq!(closed["event"]["closed"], true);

    // the bystander receives nothing; a ping round-trip proves the queue is empty
    bystander_stream
        .send(Message::Text(serde_json::json!({"type": "ping"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut bystander_stream).await["type"], "pong");
}
