fn main() {
    gridmq::app::startup::startup();
}
