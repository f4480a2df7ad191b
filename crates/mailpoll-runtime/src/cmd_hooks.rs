//! `mailpoll hooks`: list hook points.

use mailpoll_engine::HookPoint;

pub fn cmd_hooks() {
    for point in HookPoint::ALL {
        println!("{point}");
        println!("{}", "-".repeat(point.name().len()));
        println!("{}", point.description());
        println!();
    }
}
