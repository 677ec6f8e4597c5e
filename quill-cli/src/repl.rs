//! The command loop.
//!
//! One command per line. Sentence and word indices are 1-based here and
//! converted to the 0-based wire form before anything leaves the
//! process. While a write session is open, lines are `<word> <new-word>`
//! updates until ETIRW commits (or EXIT abandons the session, rolling it
//! back server-side).

use std::io::Write as _;

use quill::{Client, WriteHandle};
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  CREATE <file>                create an empty file
  DELETE <file>                delete a file you own
  READ <file>                  print a file's contents
  STREAM <file>                print a file word by word
  WRITE <file> <sentence>      lock a sentence (1-based) for editing
    <word> <new-word>          replace/append a word (1-based) in the session
    ETIRW                      commit the session
  UNDO <file>                  restore the pre-commit snapshot
  INFO <file>                  show a file's metadata
  VIEW [-a] [-l]               list files (-a: all, -l: details)
  LIST                         list known users
  ADDACCESS -R|-W <file> <user>  grant read / read-write access
  REMACCESS <file> <user>      revoke a user's access
  EXEC <file>                  run a file as a script on the coordinator
  HELP                         this text
  EXIT | QUIT                  leave";

struct Session {
    handle: WriteHandle,
    file: String,
    sentence: usize,
}

pub async fn run(mut client: Client) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session: Option<Session> = None;

    loop {
        prompt(&session)?;
        let Some(line) = lines.next_line().await? else {
            break; // EOF
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(open) = session.take() {
            match handle_session_line(open, line).await {
                SessionOutcome::Open(open) => session = Some(open),
                SessionOutcome::Closed => {}
                SessionOutcome::Quit => return Ok(()),
            }
            continue;
        }

        if !handle_command(&mut client, &mut session, line).await {
            return Ok(());
        }
    }
    Ok(())
}

fn prompt(session: &Option<Session>) -> std::io::Result<()> {
    match session {
        Some(s) => print!("[{}:{}]> ", s.file, s.sentence + 1),
        None => print!("> "),
    }
    std::io::stdout().flush()
}

enum SessionOutcome {
    Open(Session),
    Closed,
    Quit,
}

async fn handle_session_line(mut open: Session, line: &str) -> SessionOutcome {
    let mut parts = line.split_whitespace();
    let first = parts.next().unwrap_or_default();
    match first.to_ascii_uppercase().as_str() {
        "ETIRW" => match open.handle.commit().await {
            Ok(message) => {
                println!("{message}");
                SessionOutcome::Closed
            }
            Err(e) => {
                println!("Error: {e}");
                SessionOutcome::Closed
            }
        },
        "EXIT" | "QUIT" => SessionOutcome::Quit, // dropping the handle rolls back
        _ => {
            let (Ok(word), Some(value), None) =
                (first.parse::<usize>(), parts.next(), parts.next())
            else {
                println!("expected '<word> <new-word>' or ETIRW");
                return SessionOutcome::Open(open);
            };
            let Some(word) = word.checked_sub(1) else {
                println!("word indices are 1-based");
                return SessionOutcome::Open(open);
            };
            match open.handle.replace_word(word, value).await {
                Ok(message) => println!("{message}"),
                Err(e) => println!("Error: {e}"),
            }
            SessionOutcome::Open(open)
        }
    }
}

/// Returns false when the user asked to leave.
async fn handle_command(client: &mut Client, session: &mut Option<Session>, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return true;
    };
    let args: Vec<&str> = parts.collect();

    let outcome = match (command.to_ascii_uppercase().as_str(), args.as_slice()) {
        ("HELP", _) => {
            println!("{HELP}");
            Ok(None)
        }
        ("EXIT" | "QUIT", _) => return false,
        ("CREATE", [file]) => client.create(file).await.map(Some),
        ("DELETE", [file]) => client.delete(file).await.map(Some),
        ("READ", [file]) => match client.read(file).await {
            Ok(bytes) => {
                println!("{}", String::from_utf8_lossy(&bytes));
                Ok(None)
            }
            Err(e) => Err(e),
        },
        ("STREAM", [file]) => {
            let result = client
                .stream(file, |word| {
                    print!("{word} ");
                    let _ = std::io::stdout().flush();
                })
                .await;
            match result {
                Ok(_) => {
                    println!();
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
        ("WRITE", [file, sentence]) => match parse_index(sentence) {
            Some(sentence) => match client.write(file, sentence).await {
                Ok(handle) => {
                    println!("{}", handle.granted());
                    *session = Some(Session {
                        handle,
                        file: file.to_string(),
                        sentence,
                    });
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            None => {
                println!("sentence indices are 1-based");
                Ok(None)
            }
        },
        ("UNDO", [file]) => client.undo(file).await.map(Some),
        ("INFO", [file]) => client.info(file).await.map(Some),
        ("VIEW", flags) => {
            let all = flags.contains(&"-a");
            let long = flags.contains(&"-l");
            client.view(all, long).await.map(Some)
        }
        ("LIST", []) => client.list().await.map(Some),
        ("ADDACCESS", [flag @ ("-R" | "-W"), file, user]) => {
            client.add_access(file, user, *flag == "-W").await.map(Some)
        }
        ("REMACCESS", [file, user]) => client.rem_access(file, user).await.map(Some),
        ("EXEC", [file]) => client.exec(file).await.map(Some),
        _ => {
            println!("unrecognized command; try HELP");
            Ok(None)
        }
    };

    match outcome {
        Ok(Some(message)) => println!("{message}"),
        Ok(None) => {}
        Err(e) => println!("Error: {e}"),
    }
    true
}

/// 1-based surface index to 0-based wire index.
fn parse_index(text: &str) -> Option<usize> {
    text.parse::<usize>().ok()?.checked_sub(1)
}
