fn main() {
    streamwatch_lib::run()
}
