use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{auth, feedback, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(feedback::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::store::StoreError;

    /// Minimal browser: keeps cookies between requests.
    struct Client {
        app: Router,
        cookies: BTreeMap<String, String>,
    }

    impl Client {
        fn new(state: &AppState) -> Self {
            Self {
                app: build_app(state.clone()),
                cookies: BTreeMap::new(),
            }
        }

        async fn send(&mut self, mut req: Request<Body>) -> Response {
            if !self.cookies.is_empty() {
                let jar = self
                    .cookies
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                req.headers_mut()
                    .insert(header::COOKIE, jar.parse().unwrap());
            }
            let res = self.app.clone().oneshot(req).await.unwrap();
            for value in res.headers().get_all(header::SET_COOKIE) {
                let pair = value.to_str().unwrap().split(';').next().unwrap();
                let (name, val) = pair.split_once('=').unwrap();
                if val.is_empty() {
                    self.cookies.remove(name);
                } else {
                    self.cookies.insert(name.to_string(), val.to_string());
                }
            }
            res
        }

        async fn get(&mut self, uri: &str) -> Response {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn post(&mut self, uri: &str, form: &str) -> Response {
            let req = Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap();
            self.send(req).await
        }

        async fn register(&mut self, username: &str) -> Response {
            self.post(
                "/register",
                &format!(
                    "username={username}&password=pw-{username}&email={username}%40example.com\
                     &first_name=First&last_name=Last"
                ),
            )
            .await
        }

        fn has_session(&self) -> bool {
            self.cookies.contains_key("session")
        }
    }

    fn location(res: &Response) -> &str {
        res.headers()[header::LOCATION].to_str().unwrap()
    }

    async fn json(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn add_feedback(client: &mut Client, owner: &str, title: &str, content: &str) -> i32 {
        let res = client
            .post(
                &format!("/users/{owner}/feedback/add"),
                &format!("title={title}&content={content}"),
            )
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), format!("/users/{owner}"));

        let page = json(client.get(&format!("/users/{owner}")).await).await;
        page["feedback"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|f| f["title"] == title)
            .map(|f| f["id"].as_i64().unwrap() as i32)
            .max()
            .unwrap()
    }

    #[tokio::test]
    async fn health_and_root() {
        let state = AppState::fake();
        let mut client = Client::new(&state);

        let res = client.get("/health").await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = client.get("/").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/register");
    }

    #[tokio::test]
    async fn register_logs_in_and_redirects_to_user_page() {
        let state = AppState::fake();
        let mut client = Client::new(&state);

        let res = client.register("ada").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/users/ada");
        assert!(client.has_session());

        let res = client.get("/users/ada").await;
        assert_eq!(res.status(), StatusCode::OK);
        let page = json(res).await;
        assert_eq!(page["user"]["username"], "ada");
        assert_eq!(page["user"]["email"], "ada@example.com");
        assert!(page["user"].get("password_hash").is_none());
        assert_eq!(page["feedback"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn duplicate_username_is_a_field_error() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;

        let mut other = Client::new(&state);
        let res = other
            .post(
                "/register",
                "username=ada&password=x&email=imposter%40example.com&first_name=I&last_name=P",
            )
            .await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!other.has_session());
        let view = json(res).await;
        assert_eq!(view["form"], "register");
        assert_eq!(view["errors"]["username"][0], "Username taken. Please pick another");
        assert!(view["values"].get("password").is_none());

        let kept = state.store.find_user("ada").await.unwrap().unwrap();
        assert_eq!(kept.email, "ada@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_is_a_field_error() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;

        let res = Client::new(&state)
            .post(
                "/register",
                "username=grace&password=x&email=ADA%40example.com&first_name=G&last_name=H",
            )
            .await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json(res).await["errors"]["email"][0], "Email already registered");
        assert!(state.store.find_user("grace").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn usernames_that_cannot_be_routed_are_rejected() {
        let state = AppState::fake();
        for (encoded, raw) in [("a%01b", "a\u{1}b"), ("a%2Fb", "a/b"), ("a%3Fb", "a?b")] {
            let mut client = Client::new(&state);
            let res = client
                .post(
                    "/register",
                    &format!(
                        "username={encoded}&password=x&email=x%40example.com\
                         &first_name=F&last_name=L"
                    ),
                )
                .await;
            assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY, "{raw:?}");
            assert!(!client.has_session());
            assert!(json(res).await["errors"]["username"].is_array());
            assert!(state.store.find_user(raw).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn missing_fields_rerender_form() {
        let state = AppState::fake();
        let mut client = Client::new(&state);
        let res = client.post("/register", "username=ada").await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let view = json(res).await;
        for field in ["password", "email", "first_name", "last_name"] {
            assert!(view["errors"][field].is_array(), "{field} missing");
        }
        assert_eq!(view["values"]["username"], "ada");
        assert!(state.store.find_user("ada").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_failure_does_not_reveal_which_part_was_wrong() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;

        let mut client = Client::new(&state);
        let wrong_pw = client.post("/login", "username=ada&password=nope").await;
        assert_eq!(wrong_pw.status(), StatusCode::UNAUTHORIZED);
        let unknown = client.post("/login", "username=ghost&password=nope").await;
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

        let a = json(wrong_pw).await;
        let b = json(unknown).await;
        assert_eq!(a["errors"], b["errors"]);
        assert_eq!(a["errors"]["username"][0], "Invalid username/password");
        assert!(!client.has_session());
    }

    #[tokio::test]
    async fn login_sets_session_and_flashes_welcome_once() {
        let state = AppState::fake();
        let mut client = Client::new(&state);
        client.register("ada").await;
        client.get("/logout").await;
        assert!(!client.has_session());

        let res = client.post("/login", "username=ada&password=pw-ada").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/users/ada");
        assert!(client.has_session());

        let page = json(client.get("/users/ada").await).await;
        assert_eq!(page["flash"]["message"], "Welcome back, ada!");
        assert_eq!(page["flash"]["level"], "info");

        let page = json(client.get("/users/ada").await).await;
        assert!(page.get("flash").is_none());
    }

    #[tokio::test]
    async fn logout_ends_session() {
        let state = AppState::fake();
        let mut client = Client::new(&state);
        client.register("ada").await;

        let res = client.get("/logout").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/");
        assert!(!client.has_session());

        let res = client.get("/users/ada").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/register");

        // Logging out twice is harmless.
        assert_eq!(client.get("/logout").await.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn anonymous_user_page_redirects_with_notice() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;

        let mut anon = Client::new(&state);
        let res = anon.get("/users/ada").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/register");

        let view = json(anon.get("/register").await).await;
        assert_eq!(view["flash"]["level"], "danger");
        assert_eq!(view["flash"]["message"], "Please login/register first");
    }

    #[tokio::test]
    async fn forged_session_cookie_is_ignored() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;

        let mut client = Client::new(&state);
        client.cookies.insert("session".into(), "not.a.token".into());
        let res = client.get("/users/ada").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/register");
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let state = AppState::fake();
        let mut client = Client::new(&state);
        client.register("ada").await;
        assert_eq!(client.get("/users/nobody").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn other_users_page_is_forbidden() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;
        let mut grace = Client::new(&state);
        grace.register("grace").await;
        assert_eq!(grace.get("/users/ada").await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn feedback_round_trip() {
        let state = AppState::fake();
        let mut client = Client::new(&state);
        client.register("ada").await;

        let form = client.get("/users/ada/feedback/add").await;
        assert_eq!(form.status(), StatusCode::OK);
        assert_eq!(json(form).await["form"], "feedback_add");

        let id = add_feedback(&mut client, "ada", "T", "C").await;

        let page = json(client.get("/users/ada").await).await;
        let items = page["feedback"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], id);
        assert_eq!(items[0]["title"], "T");
        assert_eq!(items[0]["content"], "C");
        assert_eq!(items[0]["username"], "ada");
    }

    #[tokio::test]
    async fn invalid_feedback_rerenders_form() {
        let state = AppState::fake();
        let mut client = Client::new(&state);
        client.register("ada").await;

        let res = client.post("/users/ada/feedback/add", "title=&content=x").await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let view = json(res).await;
        assert!(view["errors"]["title"].is_array());
        assert_eq!(view["values"]["content"], "x");
        assert!(state.store.list_feedback_by_owner("ada").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn anonymous_feedback_is_rejected() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;

        let mut anon = Client::new(&state);
        let res = anon.post("/users/ada/feedback/add", "title=T&content=C").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/login");
        assert!(!anon.has_session());
        assert!(state.store.list_feedback_by_owner("ada").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn feedback_cannot_be_added_for_someone_else() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;
        let mut grace = Client::new(&state);
        grace.register("grace").await;

        let res = grace.post("/users/ada/feedback/add", "title=T&content=C").await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(state.store.list_feedback_by_owner("ada").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn owner_can_edit_and_delete_feedback() {
        let state = AppState::fake();
        let mut client = Client::new(&state);
        client.register("ada").await;
        let id = add_feedback(&mut client, "ada", "T", "C").await;

        let form = json(client.get(&format!("/feedback/{id}/update")).await).await;
        assert_eq!(form["form"], "feedback_edit");
        assert_eq!(form["values"]["title"], "T");

        let res = client
            .post(&format!("/feedback/{id}/update"), "title=T2&content=C2")
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/users/ada");
        let fb = state.store.get_feedback(id).await.unwrap();
        assert_eq!((fb.title.as_str(), fb.content.as_str()), ("T2", "C2"));

        let res = client.post(&format!("/feedback/{id}/delete"), "").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/users/ada");
        assert!(matches!(
            state.store.get_feedback(id).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn non_owner_cannot_edit_or_delete_feedback() {
        let state = AppState::fake();
        let mut ada = Client::new(&state);
        ada.register("ada").await;
        let id = add_feedback(&mut ada, "ada", "T", "C").await;

        let mut grace = Client::new(&state);
        grace.register("grace").await;

        let res = grace.get(&format!("/feedback/{id}/update")).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let res = grace
            .post(&format!("/feedback/{id}/update"), "title=hacked&content=hacked")
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let res = grace.post(&format!("/feedback/{id}/delete"), "").await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let fb = state.store.get_feedback(id).await.unwrap();
        assert_eq!((fb.title.as_str(), fb.content.as_str()), ("T", "C"));
    }

    #[tokio::test]
    async fn unknown_feedback_is_not_found() {
        let state = AppState::fake();
        let mut client = Client::new(&state);
        client.register("ada").await;
        assert_eq!(
            client.get("/feedback/999/update").await.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            client.post("/feedback/999/delete", "").await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn anonymous_feedback_edit_redirects_to_login() {
        let state = AppState::fake();
        let mut ada = Client::new(&state);
        ada.register("ada").await;
        let id = add_feedback(&mut ada, "ada", "T", "C").await;

        let mut anon = Client::new(&state);
        let res = anon
            .post(&format!("/feedback/{id}/update"), "title=x&content=y")
            .await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/login");
        assert_eq!(state.store.get_feedback(id).await.unwrap().title, "T");
    }

    #[tokio::test]
    async fn deleting_user_cascades_and_ends_session() {
        let state = AppState::fake();
        let mut ada = Client::new(&state);
        ada.register("ada").await;
        let first = add_feedback(&mut ada, "ada", "one", "1").await;
        let second = add_feedback(&mut ada, "ada", "two", "2").await;

        let res = ada.post("/users/ada/delete", "").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/");
        assert!(!ada.has_session());

        assert!(state.store.find_user("ada").await.unwrap().is_none());
        for id in [first, second] {
            assert!(matches!(
                state.store.get_feedback(id).await,
                Err(StoreError::NotFound)
            ));
        }

        let view = json(ada.get("/register").await).await;
        assert_eq!(view["flash"]["message"], "Deleted user ada");
    }

    #[tokio::test]
    async fn cannot_delete_another_user() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;
        let mut grace = Client::new(&state);
        grace.register("grace").await;

        let res = grace.post("/users/ada/delete", "").await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(state.store.find_user("ada").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn anonymous_user_delete_redirects_to_login() {
        let state = AppState::fake();
        Client::new(&state).register("ada").await;

        let res = Client::new(&state).post("/users/ada/delete", "").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), "/login");
        assert!(state.store.find_user("ada").await.unwrap().is_some());
    }
}
