use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_while_m_n},
    character::complete::{alpha1, char, space1},
    combinator::{opt, recognize, rest, verify},
    multi::many0,
    sequence::{preceded, terminated},
};

// 2.3.1 Message format in Augmented BNF (RFC 2812), plus the IRCv3 tag
// section. Only the outline is needed here: inbound lines are classified,
// never validated.

//     message    =  [ "@" tags SPACE ] [ ":" prefix SPACE ] command [ params ] crlf
//     command    =  1*letter / 3digit
//     params     =  *14( SPACE middle ) [ SPACE ":" trailing ]

#[derive(Debug, Clone, PartialEq)]
pub struct Message<'a> {
    pub tags: Option<&'a str>,
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
}

impl<'a> Message<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        message_parser(line).ok().map(|(_, message)| message)
    }

    /// Nickname part of the prefix (`nick!user@host` -> `nick`).
    pub fn source_nick(&self) -> Option<&'a str> {
        self.prefix
            .and_then(|prefix| prefix.split(['!', '@']).next())
            .filter(|nick| !nick.is_empty())
    }

    pub fn joined_params(&self) -> String {
        self.params.join(" ")
    }
}

fn tags_parser(input: &str) -> IResult<&str, &str> {
    terminated(preceded(char('@'), take_till1(|c: char| c == ' ')), space1).parse(input)
}

fn prefix_parser(input: &str) -> IResult<&str, &str> {
    terminated(preceded(char(':'), take_till1(|c: char| c == ' ')), space1).parse(input)
}

//     command    =  1*letter / 3digit
fn command_parser(input: &str) -> IResult<&str, &str> {
    alt((
        alpha1,
        recognize(take_while_m_n(3, 3, |c: char| c.is_ascii_digit())),
    ))
    .parse(input)
}

//     middle     =  nospcrlfcl *( ":" / nospcrlfcl )
fn middle_parser(input: &str) -> IResult<&str, &str> {
    verify(take_till1(|c: char| c == ' '), |s: &str| !s.starts_with(':')).parse(input)
}

//     trailing   =  *( ":" / " " / nospcrlfcl )
fn trailing_parser(input: &str) -> IResult<&str, &str> {
    preceded(tag(":"), rest).parse(input)
}

fn params_parser(input: &str) -> IResult<&str, Vec<&str>> {
    let (rem, mut params) = many0(preceded(space1, middle_parser)).parse(input)?;
    let (rem, trailing) = opt(preceded(space1, trailing_parser)).parse(rem)?;
    params.extend(trailing);
    Ok((rem, params))
}

pub fn message_parser(input: &str) -> IResult<&str, Message<'_>> {
    let (rem, (tags, prefix, command, params)) = (
        opt(tags_parser),
        opt(prefix_parser),
        command_parser,
        params_parser,
    )
        .parse(input)?;
    // trailing whitespace is tolerated
    let (rem, _) = take_till(|c: char| c != ' ').parse(rem)?;
    Ok((
        rem,
        Message {
            tags,
            prefix,
            command,
            params,
        },
    ))
}

/// What the read loop needs to know about an inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `ERROR`, or a `QUIT` echoed back for our own nick.
    Terminal,
    /// `PONG` carrying one of our numeric ping sequences.
    Pong(u64),
    /// Server keepalive we have to answer.
    Ping(String),
    Other,
}

impl Inbound {
    pub fn classify(line: &str, own_nick: &str) -> Self {
        let Some(message) = Message::parse(line) else {
            return Inbound::Other;
        };

        if message.command.eq_ignore_ascii_case("ERROR") {
            Inbound::Terminal
        } else if message.command.eq_ignore_ascii_case("QUIT") {
            match message.source_nick() {
                Some(nick) if nick.eq_ignore_ascii_case(own_nick) => Inbound::Terminal,
                _ => Inbound::Other,
            }
        } else if message.command.eq_ignore_ascii_case("PONG") {
            message
                .params
                .last()
                .and_then(|seq| seq.parse::<u64>().ok())
                .map_or(Inbound::Other, Inbound::Pong)
        } else if message.command.eq_ignore_ascii_case("PING") {
            Inbound::Ping(message.params.last().copied().unwrap_or_default().to_owned())
        } else {
            Inbound::Other
        }
    }
}
