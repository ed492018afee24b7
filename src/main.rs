fn main() -> anyhow::Result<()> {
    pbf::start()
}
