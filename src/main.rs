#[actix_web::main]
async fn main() {
    if let Err(e) = testcase_forge::app::run().await {
        eprintln!("testcase-forge failed: {}", e);
        std::process::exit(1);
    }
}
