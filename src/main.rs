fn main() -> anyhow::Result<()> {
    depinview::run()
}
