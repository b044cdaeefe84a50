use classvibes::auth::{Credentials, Role};
use classvibes::config::{ClientOptions, Config};
use classvibes::subscriptions::SubscribeOutcome;
use classvibes::ClassVibes;
use serde_json::json;
use std::path::Path;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn student_client(server: &MockServer, session_file: &Path) -> ClassVibes {
    let options = ClientOptions::default().with_session_path(session_file);
    let config = Config::new(&server.uri(), "anon".to_string())
        .unwrap()
        .with_options(options);
    ClassVibes::new(config).unwrap()
}

async fn mount_backend(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/usuario"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 12,
            "nombre": "Lucía Pérez",
            "username": "lucia",
            "contraseña": "secreta",
            "email": "lucia@example.com",
            "usuario_perfil": [{ "perfiles": { "id": 3, "nombre": "alumno" } }]
        }])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/cursos"))
        .and(query_param("idcurso", "eq.8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "idcurso": 8, "idprofesor": 2, "nombre": "Química básica", "precio": 0 }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/cursos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "idcurso": 7, "idprofesor": 2, "nombre": "Álgebra", "precio": 1500 },
            { "idcurso": 8, "idprofesor": 2, "nombre": "Química básica", "precio": 0 }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/profesores"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "idprofesor": 2, "nombre": "Ana Ruiz", "materia": "Ciencias", "fotoperfil": null }
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/usuario_cursos"))
        .and(query_param("idalumno", "eq.12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "idcurso": 7 }])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/usuario_cursos"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([{ "idcurso": 8, "idalumno": 12 }])),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn student_logs_in_browses_and_subscribes() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.json");

    let client = student_client(&server, &session_file);
    let user = client
        .auth()
        .login(&Credentials::new("lucia", "secreta"))
        .await
        .unwrap();
    assert_eq!(user.role, Role::Student);
    assert!(session_file.exists());

    // A new process picks the session up from disk
    let client = student_client(&server, &session_file);
    assert_eq!(client.auth().current_user().unwrap().id, 12);

    let listings = client.catalog().courses().await;
    assert_eq!(listings.len(), 2);
    assert!(listings[0].subscribed);
    assert!(!listings[1].subscribed);
    assert_eq!(
        listings[1].teacher.as_ref().map(|t| t.name.as_str()),
        Some("Ana Ruiz")
    );

    match client.subscriptions().subscribe(8).await.unwrap() {
        SubscribeOutcome::Subscribed { course } => assert_eq!(course.id, 8),
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert!(client.auth().logout().unwrap());
    assert!(!session_file.exists());
}
