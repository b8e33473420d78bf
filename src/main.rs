fn main() {
    ultratube_lib::run()
}
