mod cat;
pub(crate) mod filepath;
mod get;
mod label;
mod list;
mod mkdir;
mod mkfs;
mod mv;
mod put;
mod remove;

use clap::Parser;
use vfat::io::std::FileDisk;
use vfat::{FatFileSystem, MountOptions};

#[derive(Debug, clap::Args)]
struct List {
    /// Path to list, default to the root directory
    #[clap(default_value = "/")]
    path: String,
}

#[derive(Debug, clap::Args)]
struct Cat {
    /// Path of the file to concatenate
    path: String,
}

#[derive(Debug, clap::Args)]
struct Put {
    path: String,
    /// Local file to copy onto the volume
    source: String,
}

#[derive(Debug, clap::Args)]
struct Get {
    path: String,
    /// Local destination to copy into
    dest: String,
}

#[derive(Debug, clap::Args)]
struct Remove {
    /// Path to delete
    path: String,
}

#[derive(Debug, clap::Args)]
struct Mkdir {
    /// Path of the directory to create
    path: String,
}

#[derive(Debug, clap::Args)]
struct Move {
    path: String,
    new_path: String,
}

#[derive(Debug, clap::Args)]
struct Label {
    /// New label; prints the current one when absent
    label: Option<String>,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// List files and directories in the specified path
    #[clap(name = "ls")]
    List(List),
    /// Concatenate a file to the standard output
    Cat(Cat),
    /// Copy a local file onto the volume
    Put(Put),
    /// Copy a file off the volume
    Get(Get),
    /// Remove a file or an empty directory
    #[clap(name = "rm")]
    Remove(Remove),
    /// Create a directory
    Mkdir(Mkdir),
    /// Move or rename a file or directory
    #[clap(name = "mv")]
    Move(Move),
    /// Show or change the volume label
    Label(Label),
    /// Create a fresh FAT volume on the device
    Mkfs(mkfs::Mkfs),
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long)]
    quiet: bool,
    #[clap(short, action = clap::ArgAction::Count)]
    verbosity: u8,
    /// Block device or image file holding a FAT volume
    #[clap(short, long)]
    device: String,
    #[clap(subcommand)]
    action: Action,
}

fn main() {
    let args = Args::parse();
    let level = match (args.quiet, args.verbosity) {
        (true, _) => log::LevelFilter::Off,
        (_, 0) => log::LevelFilter::Info,
        (_, 1) => log::LevelFilter::Debug,
        (_, _) => log::LevelFilter::Trace,
    };
    log::set_max_level(level);
    env_logger::builder().filter(None, level).target(env_logger::Target::Stdout).init();

    if let Action::Mkfs(options) = &args.action {
        if let Some(error) = mkfs::mkfs(&args.device, options).err() {
            eprintln!("{}", error);
            std::process::exit(1);
        }
        return;
    }

    let disk = FileDisk::open(&args.device, false).expect("cannot open device");
    let mut fs = match FatFileSystem::open(disk, MountOptions::default()) {
        Ok(fs) => fs,
        Err(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
    };
    let root = fs.root().expect("freshly opened filesystem");

    let result = match args.action {
        Action::List(args) => list::list(&root, &args.path),
        Action::Cat(args) => cat::cat(&root, &args.path),
        Action::Put(args) => put::put(&root, &args.path, &args.source),
        Action::Get(args) => get::get(&root, &args.path, &args.dest),
        Action::Remove(args) => remove::remove(&root, &args.path),
        Action::Mkdir(args) => mkdir::mkdir(&root, &args.path),
        Action::Move(args) => mv::mv(&root, &args.path, &args.new_path),
        Action::Label(args) => label::label(&mut fs, args.label.as_deref()),
        Action::Mkfs(_) => unreachable!(),
    };
    let result = result.and_then(|()| fs.close());
    if let Some(error) = result.err() {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}
