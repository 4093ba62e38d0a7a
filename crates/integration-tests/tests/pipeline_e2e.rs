//! Whole pipeline: front door -> intake -> AI -> scrape, on SQLite and the in-memory broker

mod common;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{count_rows, fast_policy, sqlite_store, RunningStage, WAIT};
use smartsearch_api_http::handler::{formulary, recommend_products};
use smartsearch_api_http::AppState;
use smartsearch_core::application::codec::{decode_payload, envelope_for};
use smartsearch_core::application::{
    AiStage, IntakeStage, ScrapeStage, StageProducer, UrlCollector,
};
use smartsearch_core::domain::{
    AiRequest, Envelope, IntakeReply, PipelineTopology, ScrapeRequest, ScrapedUrls,
    AI_REQUESTS_QUEUE, INTAKE_QUEUE, RESPONSES_QUEUE, SCRAPED_URLS_QUEUE, SCRAPE_REQUESTS_QUEUE,
};
use smartsearch_core::port::broker::mocks::{InMemoryBroker, JournalEntry};
use smartsearch_core::port::completion::mocks::ScriptedCompleter;
use smartsearch_core::port::marketplace::mocks::StaticMarketplace;
use smartsearch_core::port::ProfileRepository;
use std::collections::HashSet;
use std::sync::Arc;

fn form_body() -> serde_json::Value {
    serde_json::json!({
        "nombreUsuario": "Ana",
        "edad": "29",
        "correo": "ana@example.com",
        "motivoCompra": "regalo",
        "temasDeInteres": "fotografía, viajes",
        "tendencias": 3,
        "comentarioSolicitud": "busco una cámara"
    })
}

#[tokio::test]
async fn test_intake_registers_once_and_hands_off() {
    let broker = InMemoryBroker::new();
    let (pool, repo) = sqlite_store().await;
    broker.seed(
        INTAKE_QUEUE,
        Envelope::json(form_body().to_string().into_bytes(), None),
    );

    let stage = RunningStage::spawn(IntakeStage::new(PipelineTopology::standard(), repo), &broker);
    assert!(
        broker
            .wait_until(WAIT, |b| b.ready_count(AI_REQUESTS_QUEUE) == 1
                && b.ready_count(RESPONSES_QUEUE) == 1)
            .await
    );
    stage.stop().await;

    assert_eq!(count_rows(&pool, "users").await, 1);
    assert_eq!(count_rows(&pool, "profile_tests").await, 1);
    assert_eq!(count_rows(&pool, "requests").await, 1);
    let edad: i64 = sqlx::query_scalar("SELECT edad FROM users")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(edad, 29);

    let messages = broker.messages(AI_REQUESTS_QUEUE);
    assert_eq!(messages.len(), 1);
    let request: AiRequest = decode_payload(&messages[0].payload).unwrap();
    assert_eq!(request.user_id(), Some(1));
    assert_eq!(request.formulario.tendencias, "3");
    assert_eq!(request.comentario_solicitud, "busco una cámara");
    assert_eq!(messages[0].correlation_id.as_deref(), Some("1"));

    let reply: IntakeReply = decode_payload(&broker.messages(RESPONSES_QUEUE)[0].payload).unwrap();
    assert_eq!(reply, IntakeReply::registered(1, "Ana"));
}

#[tokio::test]
async fn test_redelivered_scrape_converges_to_one_url_set() {
    let broker = InMemoryBroker::new();
    let (pool, repo) = sqlite_store().await;

    // Seed the profile through the intake stage so a request row exists
    broker.seed(
        INTAKE_QUEUE,
        Envelope::json(form_body().to_string().into_bytes(), None),
    );
    let intake = RunningStage::spawn(
        IntakeStage::new(PipelineTopology::standard(), repo.clone()),
        &broker,
    );
    assert!(
        broker
            .wait_until(WAIT, |b| b.ready_count(AI_REQUESTS_QUEUE) == 1)
            .await
    );
    intake.stop().await;

    let market = StaticMarketplace::new()
        .with_pages("a", vec![vec!["https://x/1", "https://x/2"], vec!["https://x/3"]])
        .with_pages("b", vec![vec!["https://x/2", "https://x/4"]]);
    broker.seed(
        SCRAPE_REQUESTS_QUEUE,
        envelope_for(&ScrapeRequest {
            user_id: 1,
            busquedas: vec!["a".to_string(), "b".to_string()],
            max_products_per_search: None,
        })
        .unwrap(),
    );

    // First pass stores URLs but cannot hand off, so the request is requeued
    broker.fail_publishes_to(SCRAPED_URLS_QUEUE);
    let scrape = RunningStage::spawn(
        ScrapeStage::new(
            &PipelineTopology::standard(),
            UrlCollector::new(Arc::new(market.clone())),
            repo.clone(),
            3,
        ),
        &broker,
    );
    assert!(
        broker
            .wait_until(WAIT, |b| b.journal().iter().any(|e| matches!(
                e,
                JournalEntry::Nacked { requeue: true, .. }
            )))
            .await
    );
    broker.restore_publishes_to(SCRAPED_URLS_QUEUE);
    assert!(
        broker
            .wait_until(WAIT, |b| b.ready_count(SCRAPED_URLS_QUEUE) == 1)
            .await
    );
    scrape.stop().await;

    // A single pass fetches a/1, a/2 and b/1
    assert!(market.calls().len() > 3);
    assert_eq!(broker.ready_count(SCRAPE_REQUESTS_QUEUE), 0);

    let expected = vec!["https://x/1", "https://x/2", "https://x/3", "https://x/4"];
    let result: ScrapedUrls =
        decode_payload(&broker.messages(SCRAPED_URLS_QUEUE)[0].payload).unwrap();
    assert_eq!(result.urls, expected);

    let latest = repo.find_latest_request(1).await.unwrap().unwrap();
    let mut stored: Vec<String> = repo
        .find_found_urls(latest.id)
        .await
        .unwrap()
        .into_iter()
        .map(|u| u.url)
        .collect();
    stored.sort();
    assert_eq!(stored, expected);
    assert_eq!(count_rows(&pool, "found_urls").await, 4);
}

#[tokio::test]
async fn test_form_flows_through_every_stage() {
    let broker = InMemoryBroker::new();
    let (_pool, repo) = sqlite_store().await;
    let topology = PipelineTopology::standard();

    let terms: Vec<String> = (0..10).map(|i| format!("termino {}", i)).collect();
    let answer = format!(
        "Claro, aquí tienes:\n```json\n{}\n```",
        serde_json::to_string(&terms).unwrap()
    );
    let completer = ScriptedCompleter::always(answer);

    // Neighbouring terms share result URLs
    let market = terms.iter().enumerate().fold(StaticMarketplace::new(), |market, (i, term)| {
        let urls: Vec<String> = (i..i + 3).map(|n| format!("https://x/{}", n)).collect();
        market.with_pages(
            term,
            vec![
                vec![urls[0].as_str(), urls[1].as_str()],
                vec![urls[2].as_str()],
            ],
        )
    });

    let stages = vec![
        RunningStage::spawn(IntakeStage::new(topology.clone(), repo.clone()), &broker),
        RunningStage::spawn(AiStage::new(&topology, Arc::new(completer.clone())), &broker),
        RunningStage::spawn(
            ScrapeStage::new(
                &topology,
                UrlCollector::new(Arc::new(market)),
                repo.clone(),
                3,
            ),
            &broker,
        ),
    ];

    let state = Arc::new(AppState::new(
        StageProducer::new(Arc::new(broker.clone()), fast_policy()),
        topology.intake.clone(),
        repo.clone(),
    ));
    let (status, accepted) = recommend_products(State(Arc::clone(&state)), form_body().to_string())
        .await
        .unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted.0.queue, INTAKE_QUEUE);

    assert!(
        broker
            .wait_until(WAIT, |b| b.ready_count(SCRAPED_URLS_QUEUE) == 1)
            .await
    );
    for stage in stages {
        stage.stop().await;
    }

    assert_eq!(completer.call_count(), 1);
    assert_eq!(broker.in_flight_count(), 0);
    assert_eq!(broker.ready_count(INTAKE_QUEUE), 0);
    assert_eq!(broker.ready_count(AI_REQUESTS_QUEUE), 0);
    assert_eq!(broker.ready_count(SCRAPE_REQUESTS_QUEUE), 0);

    let reply: IntakeReply = decode_payload(&broker.messages(RESPONSES_QUEUE)[0].payload).unwrap();
    let id_usuario = match reply {
        IntakeReply::Registered { id_usuario, .. } => id_usuario,
        other => panic!("expected a registration reply, got {:?}", other),
    };

    let result: ScrapedUrls =
        decode_payload(&broker.messages(SCRAPED_URLS_QUEUE)[0].payload).unwrap();
    assert_eq!(result.user_id, id_usuario);
    assert!(!result.urls.is_empty());
    assert!(result.urls.len() <= 3 * terms.len());
    let unique: HashSet<&String> = result.urls.iter().collect();
    assert_eq!(unique.len(), result.urls.len());
    // x/0 through x/11 are the only URLs served
    assert_eq!(unique.len(), 12);

    let profile = formulary(State(state), Path(id_usuario)).await.unwrap().0;
    assert_eq!(profile.usuario.nombre, "Ana");
    assert_eq!(profile.usuario.edad, 29);
    assert_eq!(profile.formulario.motivo_compra, "regalo");
    let solicitud = profile.solicitud.unwrap();
    assert_eq!(solicitud.comentario, "busco una cámara");
    let stored: HashSet<String> = solicitud.urls.into_iter().map(|u| u.url).collect();
    let published: HashSet<String> = result.urls.into_iter().collect();
    assert_eq!(stored, published);
}
