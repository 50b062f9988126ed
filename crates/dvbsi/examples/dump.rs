use std::io::Read;
use std::path::PathBuf;

use dvbsi::psi::buffer::SectionBuffer;
use dvbsi::psi::desc::{AnyDescriptor, DescriptorBlock, Standard};
use dvbsi::psi::table::AnyTable;
use dvbsi::psi::{PsiError, PsiSection};
use dvbsi::Pid;

#[derive(Debug)]
struct AppArgs {
    ts: bool,
    pid: Option<u16>,
    verbose: bool,
    no_crc: bool,
    path: PathBuf,
}

impl AppArgs {
    const HELP: &str = "\
セクションを解析して表示するコマンド

USAGE:
  dump [OPTIONS] [PATH]

FLAGS:
  -h, --help      このヘルプを表示する
  -v, --verbose   テーブルの内容をすべて表示する
  --ts            入力を188バイトのTSパケット列として扱う
  --no-crc        CRCを検証しない

OPTIONS:
  --pid [PID]     TSの場合に処理するPID。未指定の場合はすべてのPIDを処理する。

ARGS:
  <PATH>          セクションを連結したファイル、またはTSファイルのパス
";

    pub fn parse() -> Result<AppArgs, Box<dyn std::error::Error>> {
        let mut args = pico_args::Arguments::from_env();

        if args.contains(["-h", "--help"]) {
            println!("{}", Self::HELP);
            std::process::exit(0);
        }

        Ok(AppArgs {
            ts: args.contains("--ts"),
            pid: args.opt_value_from_fn("--pid", parse_pid)?,
            verbose: args.contains(["-v", "--verbose"]),
            no_crc: args.contains("--no-crc"),
            path: args.free_from_str()?,
        })
    }
}

fn parse_pid(s: &str) -> Result<u16, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn standard_of(table: &AnyTable) -> Standard {
    match table {
        AnyTable::Pat(_) | AnyTable::Cat(_) | AnyTable::Pmt(_) | AnyTable::Tsdt(_) => {
            Standard::Mpeg
        }
        AnyTable::Mgt(_)
        | AnyTable::Vct(_)
        | AnyTable::Rrt(_)
        | AnyTable::AtscEit(_)
        | AnyTable::Ett(_)
        | AnyTable::Stt(_) => Standard::Atsc,
        _ => Standard::Dvb,
    }
}

fn print_time(label: &str, unix: i64) {
    match chrono::DateTime::from_timestamp(unix, 0) {
        Some(dt) => println!("  {}: {}", label, dt.format("%Y-%m-%d %H:%M:%S UTC")),
        None => println!("  {}: (out of range)", label),
    }
}

fn print_descriptors(indent: usize, descriptors: &DescriptorBlock, standard: Standard) {
    for raw in descriptors {
        let name = standard.descriptor_name(raw.tag).unwrap_or("unknown");
        match AnyDescriptor::read(raw, standard) {
            Ok(AnyDescriptor::Unknown(_)) => {
                println!("{:indent$}{:#04X} {} ({} bytes)", "", raw.tag, name, raw.data.len());
            }
            Ok(desc) => println!("{:indent$}{:#04X} {} {:?}", "", raw.tag, name, desc),
            Err(e) => println!("{:indent$}{:#04X} {} <{}>", "", raw.tag, name, e),
        }
    }
}

fn print_section(args: &AppArgs, pid: Option<Pid>, psi: &PsiSection) {
    let table = match AnyTable::read(psi) {
        Ok(table) => table,
        Err(PsiError::UnsupportedTableId(table_id)) => {
            log::debug!("skip table_id {:#04X}", table_id);
            return;
        }
        Err(e) => {
            log::warn!("table_id {:#04X}: {}", psi.table_id, e);
            return;
        }
    };

    match pid {
        Some(pid) => println!("{} (table_id={:#04X}, pid={})", table.name(), psi.table_id, pid),
        None => println!("{} (table_id={:#04X})", table.name(), psi.table_id),
    }

    if args.verbose {
        println!("{:#?}", table);
        return;
    }

    let standard = standard_of(&table);
    match &table {
        AnyTable::Pat(pat) => {
            for program in &pat.programs {
                println!("  program {} -> {}", program.program_number, program.program_map_pid);
            }
        }
        AnyTable::Pmt(pmt) => {
            print_descriptors(2, &pmt.descriptors, standard);
            for stream in &pmt.streams {
                println!("  stream {:#04X} {}", stream.stream_type.0, stream.elementary_pid);
                print_descriptors(4, &stream.descriptors, standard);
            }
        }
        AnyTable::Sdt(sdt) => {
            for service in &sdt.services {
                println!("  service {:#06X} {:?}", service.service_id, service.running_status);
                print_descriptors(4, &service.descriptors, standard);
            }
        }
        AnyTable::Eit(eit) => {
            for event in &eit.events {
                match &event.start_time {
                    Some(start_time) => println!("  event {:#06X} {}", event.event_id, start_time),
                    None => println!("  event {:#06X} (undefined)", event.event_id),
                }
                print_descriptors(4, &event.descriptors, standard);
            }
        }
        AnyTable::Tdt(tdt) => print_time("utc_time", tdt.utc_time.to_unix()),
        AnyTable::Tot(tot) => {
            print_time("utc_time", tot.utc_time.to_unix());
            print_descriptors(2, &tot.descriptors, standard);
        }
        AnyTable::Stt(stt) => print_time("system_time", stt.to_unix()),
        AnyTable::Vct(vct) => {
            for ch in &vct.channels {
                println!(
                    "  {}-{} {} (source_id={})",
                    ch.major_channel_number, ch.minor_channel_number, ch.short_name, ch.source_id
                );
                print_descriptors(4, &ch.descriptors, standard);
            }
        }
        _ => {}
    }
}

fn dump_sections(args: &AppArgs, data: &[u8]) {
    let verify_crc = !args.no_crc;
    let mut buf = data;
    while !buf.is_empty() {
        match PsiSection::parse(buf, verify_crc) {
            Ok((psi, len)) => {
                print_section(args, None, &psi);
                buf = &buf[len..];
            }
            Err(PsiError::EndOfPsi) => break,
            Err(e) => {
                log::error!("{} bytes left: {}", buf.len(), e);
                break;
            }
        }
    }
}

fn dump_ts(args: &AppArgs, data: &[u8]) {
    let verify_crc = !args.no_crc;
    let mut buffers = fxhash::FxHashMap::<Pid, SectionBuffer>::default();

    for packet in data.chunks_exact(188) {
        if packet[0] != 0x47 {
            log::warn!("sync byte lost");
            continue;
        }
        // transport_error_indicator
        if packet[1] & 0x80 != 0 {
            continue;
        }

        let pid = Pid::read(&packet[1..=2]);
        if args.pid.map_or(false, |p| p != pid.get()) {
            continue;
        }

        let unit_start = packet[1] & 0x40 != 0;
        let payload = match (packet[3] >> 4) & 0b11 {
            0b01 => &packet[4..],
            0b11 => {
                let len = packet[4] as usize;
                match packet.get(5 + len..) {
                    Some(payload) => payload,
                    None => continue,
                }
            }
            _ => continue,
        };

        buffers
            .entry(pid)
            .or_insert_with(|| SectionBuffer::new(verify_crc))
            .push(payload, unit_start, |psi| print_section(args, Some(pid), psi));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = AppArgs::parse()?;

    let mut data = Vec::new();
    std::fs::File::open(&args.path)?.read_to_end(&mut data)?;

    if args.ts {
        dump_ts(&args, &data);
    } else {
        dump_sections(&args, &data);
    }

    Ok(())
}
