// Text-mode driver for the SSD1306 status display, 128x64 over i2c.
//
// Page-addressed framebuffer with a 6x8 font; nothing fancier than what the
// status mirror needs. `flush_page` exists so the main loop can push one
// page per critical section instead of stalling interrupts for the whole
// kilobyte.

use embedded_hal::i2c::I2c;

pub const ADDRESS: u8 = 0x3C;

pub const WIDTH: usize = 128;
pub const PAGES: usize = 8;

// control bytes preceding command/data traffic
const CTRL_COMMAND: u8 = 0x00;
const CTRL_DATA: u8 = 0x40;

const INIT_SEQUENCE: [u8; 25] = [
    0xAE, // display off
    0xD5, 0x80, // clock divide
    0xA8, 0x3F, // multiplex 1/64
    0xD3, 0x00, // no display offset
    0x40, // start line 0
    0x8D, 0x14, // charge pump on
    0x20, 0x02, // page addressing mode
    0xA1, // segment remap
    0xC8, // COM scan direction remapped
    0xDA, 0x12, // COM pins, alternative
    0x81, 0xCF, // contrast
    0xD9, 0xF1, // precharge
    0xDB, 0x40, // VCOMH deselect
    0xA4, // follow RAM content
    0xA6, // non-inverted
    0xAF, // display on
];

pub struct Oled {
    framebuffer: [[u8; WIDTH]; PAGES],
}

impl Oled {
    pub const fn new() -> Self {
        Self {
            framebuffer: [[0; WIDTH]; PAGES],
        }
    }

    pub fn init<T: I2c>(&mut self, i2c: &mut T) -> Result<(), T::Error> {
        for command in INIT_SEQUENCE {
            write_command(i2c, command)?;
        }
        self.clear();
        for page in 0..PAGES {
            self.flush_page(i2c, page)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.framebuffer = [[0; WIDTH]; PAGES];
    }

    /// Draws `text` starting at pixel column `x` on the given 8-pixel page
    /// row. Anything past the right edge is cut off.
    pub fn show_string(&mut self, x: usize, page: usize, text: &str) {
        if page >= PAGES {
            return;
        }
        let mut col = x;
        for ch in text.chars() {
            if col + FONT_WIDTH > WIDTH {
                break;
            }
            self.framebuffer[page][col..col + FONT_WIDTH].copy_from_slice(&glyph(ch));
            col += FONT_WIDTH;
        }
    }

    /// Pushes one framebuffer page to the panel.
    pub fn flush_page<T: I2c>(&mut self, i2c: &mut T, page: usize) -> Result<(), T::Error> {
        write_command(i2c, 0xB0 | page as u8)?; // page address
        write_command(i2c, 0x00)?; // column 0, low nibble
        write_command(i2c, 0x10)?; // column 0, high nibble
        let mut chunk = [0u8; 1 + WIDTH];
        chunk[0] = CTRL_DATA;
        chunk[1..].copy_from_slice(&self.framebuffer[page]);
        i2c.write(ADDRESS, &chunk)
    }
}

fn write_command<T: I2c>(i2c: &mut T, command: u8) -> Result<(), T::Error> {
    i2c.write(ADDRESS, &[CTRL_COMMAND, command])
}

const FONT_WIDTH: usize = 6;

fn glyph(ch: char) -> [u8; FONT_WIDTH] {
    let index = match ch {
        ' '..='_' => ch as usize - 0x20,
        _ => b'?' as usize - 0x20,
    };
    let c = FONT_5X8[index];
    // one blank column between characters
    [c[0], c[1], c[2], c[3], c[4], 0x00]
}

// column-major 5x8 glyphs, ASCII 0x20..=0x5F (uppercase set)
const FONT_5X8: [[u8; 5]; 64] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // space
    [0x00, 0x00, 0x5F, 0x00, 0x00], // !
    [0x00, 0x07, 0x00, 0x07, 0x00], // "
    [0x14, 0x7F, 0x14, 0x7F, 0x14], // #
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], // $
    [0x23, 0x13, 0x08, 0x64, 0x62], // %
    [0x36, 0x49, 0x55, 0x22, 0x50], // &
    [0x00, 0x05, 0x03, 0x00, 0x00], // '
    [0x00, 0x1C, 0x22, 0x41, 0x00], // (
    [0x00, 0x41, 0x22, 0x1C, 0x00], // )
    [0x14, 0x08, 0x3E, 0x08, 0x14], // *
    [0x08, 0x08, 0x3E, 0x08, 0x08], // +
    [0x00, 0x50, 0x30, 0x00, 0x00], // ,
    [0x08, 0x08, 0x08, 0x08, 0x08], // -
    [0x00, 0x60, 0x60, 0x00, 0x00], // .
    [0x20, 0x10, 0x08, 0x04, 0x02], // /
    [0x3E, 0x51, 0x49, 0x45, 0x3E], // 0
    [0x00, 0x42, 0x7F, 0x40, 0x00], // 1
    [0x42, 0x61, 0x51, 0x49, 0x46], // 2
    [0x21, 0x41, 0x45, 0x4B, 0x31], // 3
    [0x18, 0x14, 0x12, 0x7F, 0x10], // 4
    [0x27, 0x45, 0x45, 0x45, 0x39], // 5
    [0x3C, 0x4A, 0x49, 0x49, 0x30], // 6
    [0x01, 0x71, 0x09, 0x05, 0x03], // 7
    [0x36, 0x49, 0x49, 0x49, 0x36], // 8
    [0x06, 0x49, 0x49, 0x29, 0x1E], // 9
    [0x00, 0x36, 0x36, 0x00, 0x00], // :
    [0x00, 0x56, 0x36, 0x00, 0x00], // ;
    [0x08, 0x14, 0x22, 0x41, 0x00], // <
    [0x14, 0x14, 0x14, 0x14, 0x14], // =
    [0x00, 0x41, 0x22, 0x14, 0x08], // >
    [0x02, 0x01, 0x51, 0x09, 0x06], // ?
    [0x32, 0x49, 0x79, 0x41, 0x3E], // @
    [0x7E, 0x11, 0x11, 0x11, 0x7E], // A
    [0x7F, 0x49, 0x49, 0x49, 0x36], // B
    [0x3E, 0x41, 0x41, 0x41, 0x22], // C
    [0x7F, 0x41, 0x41, 0x22, 0x1C], // D
    [0x7F, 0x49, 0x49, 0x49, 0x41], // E
    [0x7F, 0x09, 0x09, 0x09, 0x01], // F
    [0x3E, 0x41, 0x49, 0x49, 0x7A], // G
    [0x7F, 0x08, 0x08, 0x08, 0x7F], // H
    [0x00, 0x41, 0x7F, 0x41, 0x00], // I
    [0x20, 0x40, 0x41, 0x3F, 0x01], // J
    [0x7F, 0x08, 0x14, 0x22, 0x41], // K
    [0x7F, 0x40, 0x40, 0x40, 0x40], // L
    [0x7F, 0x02, 0x0C, 0x02, 0x7F], // M
    [0x7F, 0x04, 0x08, 0x10, 0x7F], // N
    [0x3E, 0x41, 0x41, 0x41, 0x3E], // O
    [0x7F, 0x09, 0x09, 0x09, 0x06], // P
    [0x3E, 0x41, 0x51, 0x21, 0x5E], // Q
    [0x7F, 0x09, 0x19, 0x29, 0x46], // R
    [0x46, 0x49, 0x49, 0x49, 0x31], // S
    [0x01, 0x01, 0x7F, 0x01, 0x01], // T
    [0x3F, 0x40, 0x40, 0x40, 0x3F], // U
    [0x1F, 0x20, 0x40, 0x20, 0x1F], // V
    [0x3F, 0x40, 0x38, 0x40, 0x3F], // W
    [0x63, 0x14, 0x08, 0x14, 0x63], // X
    [0x07, 0x08, 0x70, 0x08, 0x07], // Y
    [0x61, 0x51, 0x49, 0x45, 0x43], // Z
    [0x00, 0x7F, 0x41, 0x41, 0x00], // [
    [0x02, 0x04, 0x08, 0x10, 0x20], // backslash
    [0x00, 0x41, 0x41, 0x7F, 0x00], // ]
    [0x04, 0x02, 0x01, 0x02, 0x04], // ^
    [0x40, 0x40, 0x40, 0x40, 0x40], // _
];
