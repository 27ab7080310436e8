#[tokio::main]
async fn main() {
    backoffice::start(std::env::args()).await;
}
