const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

pub fn print_banner() {
    println!();
    println!("{GREEN}   ____  ____  __  _______ _________   _______{RESET}");
    println!("{GREEN}  / __ \\/ __ \\/ / / / ___// ___/ __ `/ / ___/ /_{RESET}");
    println!("{GREEN} / /_/ / /_/ / /_/ (__  ) /__/ /_/ /_ (__  ) __/{RESET}");
    println!("{GREEN} \\____/ .___/\\__,_/____/\\___/\\__,_/(_)____/\\__/{RESET}");
    println!("{GREEN}     /_/{RESET}");
    println!("{DIM}==============================================={RESET}");

    print_row("Version", env!("CARGO_PKG_VERSION"), CYAN);
    print_row("Branch", env_or!("GIT_BRANCH", "unknown"), RESET);
    print_row("Commit", env_or!("GIT_COMMIT", "unknown"), RESET);
    print_row(
        "Profile",
        if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
        RESET,
    );
    println!();
}

fn print_row(label: &str, value: &str, color: &str) {
    println!(" {DIM}{label:<10}{RESET} {BOLD}{color}{value}{RESET}");
}
