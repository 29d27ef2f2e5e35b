use actix_web::{web, HttpResponse};

use crate::comic_client::ComicClient;
use crate::startup::ComicAttempts;

#[tracing::instrument(name = "Random comic handler", skip(comic_client, attempts))]
pub async fn handle_random_comic(
    comic_client: web::Data<ComicClient>,
    attempts: web::Data<ComicAttempts>,
) -> HttpResponse {
    let comic = comic_client.fetch_random_comic(attempts.0).await;

    HttpResponse::Ok().json(comic)
}
