#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subject_id = std::env::args().nth(1);
    if let Err(e) = answer_evaluator::run_once(subject_id.as_deref()).await {
        eprintln!("evaluate-once fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
