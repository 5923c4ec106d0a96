//! TaxIn Backend - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    taxin_backend::run().await;
}
