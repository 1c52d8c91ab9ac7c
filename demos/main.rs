//! Exercises the LSA API end to end across a couple of threads. Not part of
//! the crate's public contract; just a way to see the clone/write/read
//! lifecycle run against real OS pages.

use std::thread;

fn main() {
    env_logger::init();

    lsa::api::create(4096).expect("create");
    lsa::api::write(0, 5, b"aaaaa").expect("write");

    let owner = thread::current().id();
    let cloner = thread::spawn(move || {
        lsa::api::clone_from(owner).expect("clone");

        let mut buf = [0u8; 5];
        lsa::api::read(0, 5, &mut buf).expect("read");
        println!("cloner sees: {:?}", std::str::from_utf8(&buf).unwrap());

        lsa::api::write(0, 5, b"bbbbb").expect("write after clone");
        lsa::api::read(0, 5, &mut buf).expect("read after own write");
        println!("cloner now sees: {:?}", std::str::from_utf8(&buf).unwrap());

        lsa::api::destroy().expect("destroy");
    });
    cloner.join().expect("cloner thread panicked");

    let mut buf = [0u8; 5];
    lsa::api::read(0, 5, &mut buf).expect("read");
    println!("owner still sees: {:?}", std::str::from_utf8(&buf).unwrap());

    lsa::api::destroy().expect("destroy");
}
