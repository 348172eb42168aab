//! Interactive REPL-style command-line interface client.

use std::io::{self, Write};
use std::str::SplitWhitespace;

use color_print::{cprint, cprintln};

use gavel::{
    Amount, AuctionStatus, BidResponse, FailoverClient, GavelError, Outcome,
    ResultResponse,
};

/// Prompt string at the start of line.
const PROMPT: &str = ">>>>> ";

/// Recognizable command types.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    /// Place a bid.
    Bid { bidder_id: String, amount: Amount },

    /// Query the auction result.
    Result,

    /// Print help message.
    PrintHelp,

    /// Client exit.
    Exit,

    /// Nothing read.
    Nothing,
}

/// Interactive REPL-style client struct.
pub struct ClientRepl {
    /// Failover client to the auction service.
    client: FailoverClient,

    /// User input buffer.
    input_buf: String,
}

impl ClientRepl {
    /// Creates a new REPL-style client.
    pub fn new(client: FailoverClient) -> Self {
        ClientRepl {
            client,
            input_buf: String::new(),
        }
    }

    /// Prints the prompt string.
    #[inline]
    fn print_prompt() -> Result<(), GavelError> {
        cprint!("<bright-yellow>{}</>", PROMPT);
        io::stdout().flush()?;
        Ok(())
    }

    /// Prints (optionally) an error message and the help message.
    fn print_help(err: Option<&GavelError>) {
        if let Some(e) = err {
            cprintln!("<bright-red>✗</> {}", e);
        }
        println!("HELP: Supported commands are:");
        println!("          bid <bidder> <amount>");
        println!("          result");
        println!("          help");
        println!("          exit");
        println!("      Bidder names cannot contain any whitespaces");
    }

    /// Expect to get the next segment string from parsed segs.
    #[inline]
    fn expect_next_seg<'s>(
        segs: &mut SplitWhitespace<'s>,
    ) -> Result<&'s str, GavelError> {
        segs.next().ok_or_else(|| GavelError::msg("not enough args"))
    }

    /// Parses one input line into a command.
    fn parse_command(line: &str) -> Result<ReplCommand, GavelError> {
        let mut segs = line.split_whitespace();
        let cmd_type = match segs.next() {
            Some(seg) => seg,
            None => return Ok(ReplCommand::Nothing),
        };

        match &cmd_type.to_lowercase()[..] {
            "bid" => {
                // bidder names are kept as-is, no case conversions
                let bidder_id = Self::expect_next_seg(&mut segs)?;
                let amount = Self::expect_next_seg(&mut segs)?.parse()?;
                Ok(ReplCommand::Bid {
                    bidder_id: bidder_id.into(),
                    amount,
                })
            }

            "result" => Ok(ReplCommand::Result),

            "help" => Ok(ReplCommand::PrintHelp),

            "exit" => Ok(ReplCommand::Exit),

            _ => Err(GavelError(format!("unrecognized command: {}", cmd_type))),
        }
    }

    /// Reads in user input and parses into a command.
    fn read_command(&mut self) -> Result<ReplCommand, GavelError> {
        self.input_buf.clear();
        let nread = io::stdin().read_line(&mut self.input_buf)?;
        if nread == 0 {
            return Ok(ReplCommand::Exit);
        }
        Self::parse_command(&self.input_buf)
    }

    /// Prints a bid response.
    fn print_bid(response: &BidResponse) {
        match response.outcome {
            Outcome::Success => {
                cprintln!("<bright-green>✓</> SUCCESS {}", response.message)
            }
            Outcome::Fail => {
                cprintln!("<bright-cyan>✗</> FAIL {}", response.message)
            }
            Outcome::Exception => {
                cprintln!("<bright-red>✗</> EXCEPTION {}", response.message)
            }
        }
    }

    /// Prints an auction result.
    fn print_result(result: &ResultResponse) {
        let status = match result.status {
            AuctionStatus::Ongoing => "ONGOING",
            AuctionStatus::Closed => "CLOSED",
        };
        if result.highest_bidder_id.is_empty() {
            cprintln!("<bright-blue>#</> {} no bids yet", status);
        } else {
            cprintln!(
                "<bright-blue>#</> {} highest {} by {}",
                status,
                result.highest_amount,
                result.highest_bidder_id
            );
        }
    }

    /// One iteration of the REPL loop.
    async fn iter(&mut self) -> Result<bool, GavelError> {
        Self::print_prompt()?;

        let cmd = match self.read_command() {
            Ok(cmd) => cmd,
            Err(e) => {
                Self::print_help(Some(&e));
                return Ok(true);
            }
        };
        match cmd {
            ReplCommand::Exit => {
                println!("Exitting...");
                Ok(false)
            }

            ReplCommand::Nothing => Ok(true),

            ReplCommand::PrintHelp => {
                Self::print_help(None);
                Ok(true)
            }

            ReplCommand::Bid { bidder_id, amount } => {
                match self.client.place_bid(&bidder_id, amount).await {
                    Ok(response) => Self::print_bid(&response),
                    Err(e) => cprintln!("<bright-red>✗</> call failed: {}", e),
                }
                Ok(true)
            }

            ReplCommand::Result => {
                match self.client.get_result().await {
                    Ok(result) => Self::print_result(&result),
                    Err(e) => cprintln!("<bright-red>✗</> call failed: {}", e),
                }
                Ok(true)
            }
        }
    }

    /// Runs the REPL loop until exit or end of input.
    pub async fn run(&mut self) -> Result<(), GavelError> {
        while self.iter().await? {}
        Ok(())
    }
}
